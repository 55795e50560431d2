use std::{
    fmt::{self, Write},
    format_args as f,
};

use crate::{
    ast::{BinaryOp, Literal},
    ir,
    types::Type,
};

const DEFAULT_CODE_CAPACITY: usize = 4 * 1024; // 4 KiB

/// The import block every generated program starts with.
const IMPORTS: &str = "\
import java.math.BigDecimal;
import java.math.BigInteger;
import java.math.RoundingMode;
import java.util.List;
import java.util.Objects;";

/// Java forms of the native functions and fixtures, emitted as members of
/// the synthetic `Main` class so generated calls resolve.
const DEFINITIONS: &str = r#"    static Void debug(Object object) {
        System.out.println(object);
        return null;
    }

    static Void print(Object object) {
        System.out.println(object);
        return null;
    }

    static Object log(Object object) {
        System.out.println("log: " + object);
        return object;
    }

    static List<Object> list(Object... objects) {
        return List.of(objects);
    }

    static List<BigInteger> range(BigInteger start, BigInteger end) {
        var elements = new java.util.ArrayList<BigInteger>();
        for (var current = start; current.compareTo(end) < 0; current = current.add(BigInteger.ONE)) {
            elements.add(current);
        }
        return elements;
    }

    static String variable = "variable";

    static List<Object> function(Object... objects) {
        return List.of(objects);
    }

    static Object object = new Object() {
        String property = "property";
        List<Object> method(Object... objects) {
            return List.of(objects);
        }
    };"#;

/// Emits the IR as a Java program.
///
/// Java has no nested functions, so top-level `LET`/`DEF` statements are
/// hoisted into static members of a synthetic `Main` class; the first
/// statement of any other kind opens the synthetic `main` entry point and
/// every following top-level statement lands inside it.
pub fn generate(source: &ir::Source) -> String {
    let mut generator = Generator {
        code: String::with_capacity(DEFAULT_CODE_CAPACITY),
        indent: 0,
    };
    generator.gen_source(source);
    generator.code
}

struct Generator {
    code: String,
    indent: usize,
}

impl Generator {
    fn gen_source(&mut self, source: &ir::Source) {
        self.emit(f!("{IMPORTS}\n\n"));
        self.emit(f!("public final class Main {{\n\n"));
        self.emit(f!("{DEFINITIONS}\n"));

        self.indent = 1;
        let mut main = false;
        for statement in &source.statements {
            self.newline();
            if !main {
                if let ir::Stmt::Let(_) | ir::Stmt::Def(_) = statement {
                    self.emit(f!("static "));
                } else {
                    self.emit(f!("public static void main(String[] args) {{"));
                    main = true;
                    self.indent = 2;
                    self.newline();
                }
            }
            self.gen_stmt(statement);
        }
        if main {
            self.emit(f!("\n    }}"));
        }
        self.indent = 0;
        self.emit(f!("\n\n}}"));
    }

    fn gen_stmt(&mut self, stmt: &ir::Stmt) {
        match stmt {
            ir::Stmt::Let(stmt) => self.gen_let(stmt),
            ir::Stmt::Def(stmt) => self.gen_def(stmt),
            ir::Stmt::If(stmt) => self.gen_if(stmt),
            ir::Stmt::For(stmt) => self.gen_for(stmt),
            ir::Stmt::Return(stmt) => self.gen_return(stmt),
            ir::Stmt::Expression(stmt) => {
                self.gen_expr(&stmt.expression);
                self.emit(f!(";"));
            }
            ir::Stmt::Assignment(stmt) => self.gen_assignment(stmt),
        }
    }

    fn gen_let(&mut self, stmt: &ir::Let) {
        // Object types have no Java spelling; their declarations rely on
        // inference.
        if let Type::Object(_) = stmt.ty {
            self.emit(f!("var {}", stmt.name));
        } else {
            self.emit(f!("{} {}", stmt.ty.jvm_name(), stmt.name));
        }
        if let Some(value) = &stmt.value {
            self.emit(f!(" = "));
            self.gen_expr(value);
        }
        self.emit(f!(";"));
    }

    fn gen_def(&mut self, stmt: &ir::Def) {
        self.emit(f!("{} {}(", stmt.returns.jvm_name(), stmt.name));
        for (index, parameter) in stmt.parameters.iter().enumerate() {
            if index > 0 {
                self.emit(f!(", "));
            }
            self.emit(f!("{} {}", parameter.ty.jvm_name(), parameter.name));
        }
        self.emit(f!(") {{"));
        self.gen_body(&stmt.body);
        self.newline();
        self.emit(f!("}}"));
    }

    fn gen_if(&mut self, stmt: &ir::If) {
        self.emit(f!("if ("));
        self.gen_expr(&stmt.condition);
        self.emit(f!(") {{"));
        self.gen_body(&stmt.then_body);
        if !stmt.else_body.is_empty() {
            self.newline();
            self.emit(f!("}} else {{"));
            self.gen_body(&stmt.else_body);
        }
        self.newline();
        self.emit(f!("}}"));
    }

    fn gen_for(&mut self, stmt: &ir::For) {
        self.emit(f!("for ({} {} : ", stmt.ty.jvm_name(), stmt.name));
        self.gen_expr(&stmt.iterable);
        self.emit(f!(") {{"));
        self.gen_body(&stmt.body);
        self.newline();
        self.emit(f!("}}"));
    }

    fn gen_return(&mut self, stmt: &ir::Return) {
        self.emit(f!("return "));
        match &stmt.value {
            Some(value) => self.gen_expr(value),
            None => self.emit(f!("null")),
        }
        self.emit(f!(";"));
    }

    fn gen_assignment(&mut self, stmt: &ir::Assignment) {
        match stmt {
            ir::Assignment::Variable { variable, value } => {
                self.emit(f!("{} = ", variable.name));
                self.gen_expr(value);
                self.emit(f!(";"));
            }
            ir::Assignment::Property { property, value } => {
                self.gen_expr(&property.receiver);
                self.emit(f!(".{} = ", property.name));
                self.gen_expr(value);
                self.emit(f!(";"));
            }
        }
    }

    /// Emits an indented statement block, without the closing newline.
    fn gen_body(&mut self, body: &[ir::Stmt]) {
        self.indent += 1;
        for statement in body {
            self.newline();
            self.gen_stmt(statement);
        }
        self.indent -= 1;
    }

    fn gen_expr(&mut self, expr: &ir::Expr) {
        match expr {
            ir::Expr::Literal { value, .. } => self.gen_literal(value),
            ir::Expr::Group(inner) => {
                self.emit(f!("("));
                self.gen_expr(inner);
                self.emit(f!(")"));
            }
            ir::Expr::Binary {
                op,
                left,
                right,
                ty,
            } => self.gen_binary(*op, left, right, ty),
            ir::Expr::Variable(variable) => self.emit(f!("{}", variable.name)),
            ir::Expr::Property(property) => {
                self.gen_expr(&property.receiver);
                self.emit(f!(".{}", property.name));
            }
            ir::Expr::Function {
                name, arguments, ..
            } => {
                self.emit(f!("{name}("));
                self.gen_arguments(arguments);
                self.emit(f!(")"));
            }
            ir::Expr::Method {
                receiver,
                name,
                arguments,
                ..
            } => {
                self.gen_expr(receiver);
                self.emit(f!(".{name}("));
                self.gen_arguments(arguments);
                self.emit(f!(")"));
            }
            ir::Expr::ObjectExpr(object) => self.gen_object(object),
        }
    }

    fn gen_literal(&mut self, literal: &Literal) {
        match literal {
            Literal::Nil => self.emit(f!("null")),
            Literal::Boolean(value) => self.emit(f!("{value}")),
            Literal::Integer(value) => self.emit(f!("new BigInteger(\"{value}\")")),
            Literal::Decimal(value) => self.emit(f!("new BigDecimal(\"{value}\")")),
            Literal::String(value) => self.emit(f!("\"{}\"", escape_string(value))),
            // The target has no spelling for our character values here; an
            // IR carrying one is an upstream bug.
            Literal::Character(value) => {
                panic!("character literal {value:?} reached the generator")
            }
        }
    }

    fn gen_binary(&mut self, op: BinaryOp, left: &ir::Expr, right: &ir::Expr, ty: &Type) {
        match op {
            BinaryOp::Add if *ty == Type::String => {
                self.gen_expr(left);
                self.emit(f!(" + "));
                self.gen_expr(right);
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
                let method = match op {
                    BinaryOp::Add => "add",
                    BinaryOp::Sub => "subtract",
                    BinaryOp::Mul => "multiply",
                    _ => "divide",
                };
                self.emit(f!("("));
                self.gen_expr(left);
                self.emit(f!(").{method}("));
                self.gen_expr(right);
                if op == BinaryOp::Div && *ty == Type::Decimal {
                    self.emit(f!(", RoundingMode.HALF_EVEN"));
                }
                self.emit(f!(")"));
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                self.emit(f!("("));
                self.gen_expr(left);
                self.emit(f!(").compareTo("));
                self.gen_expr(right);
                self.emit(f!(") {} 0", op.literal()));
            }
            BinaryOp::Eq | BinaryOp::Ne => {
                if op == BinaryOp::Ne {
                    self.emit(f!("!"));
                }
                self.emit(f!("Objects.equals("));
                self.gen_expr(left);
                self.emit(f!(", "));
                self.gen_expr(right);
                self.emit(f!(")"));
            }
            BinaryOp::And => {
                // `a || b && c` would rebind our left-associative
                // `(a OR b) AND c`, so an OR left operand keeps its
                // parentheses.
                let left_is_or = matches!(
                    left,
                    ir::Expr::Binary {
                        op: BinaryOp::Or,
                        ..
                    }
                );
                if left_is_or {
                    self.emit(f!("("));
                    self.gen_expr(left);
                    self.emit(f!(")"));
                } else {
                    self.gen_expr(left);
                }
                self.emit(f!(" && "));
                self.gen_expr(right);
            }
            BinaryOp::Or => {
                self.gen_expr(left);
                self.emit(f!(" || "));
                self.gen_expr(right);
            }
        }
    }

    fn gen_object(&mut self, object: &ir::ObjectExpr) {
        self.emit(f!("new Object() {{"));
        self.indent += 1;
        for field in &object.fields {
            self.newline();
            self.gen_let(field);
        }
        for method in &object.methods {
            self.newline();
            self.gen_def(method);
        }
        self.indent -= 1;
        self.newline();
        self.emit(f!("}}"));
    }

    fn gen_arguments(&mut self, arguments: &[ir::Expr]) {
        for (index, argument) in arguments.iter().enumerate() {
            if index > 0 {
                self.emit(f!(", "));
            }
            self.gen_expr(argument);
        }
    }
}

// Utility functions.
impl Generator {
    fn emit(&mut self, f: fmt::Arguments<'_>) {
        self.code
            .write_fmt(f)
            .expect("code emit should be infallible");
    }

    fn newline(&mut self) {
        self.code.push('\n');
        for _ in 0..self.indent {
            self.code.push_str("    ");
        }
    }
}

fn escape_string(value: &str) -> String {
    let mut buf = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => buf.push_str("\\\\"),
            '"' => buf.push_str("\\\""),
            '\n' => buf.push_str("\\n"),
            '\r' => buf.push_str("\\r"),
            '\t' => buf.push_str("\\t"),
            '\x08' => buf.push_str("\\b"),
            c => buf.push(c),
        }
    }
    buf
}
