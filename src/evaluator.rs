use std::{fmt, rc::Rc};

use bigdecimal::{BigDecimal, RoundingMode};
use num_bigint::BigInt;
use num_traits::Zero;

use crate::{ast, scope::Scope};

type Result<T, E = Error> = std::result::Result<T, E>;

/// Walks the untyped AST, producing the program's value.
///
/// Evaluation is strict, left-to-right and single-threaded. The injected
/// root scope provides the native functions (see [`crate::environment`]);
/// top-level statements define directly into it. The evaluator does not
/// depend on the analyzer: untypable programs simply fail at runtime.
pub fn evaluate(source: &ast::Source, scope: Scope<RuntimeValue>) -> Result<RuntimeValue> {
    Evaluator { scope }.evaluate_source(source)
}

#[derive(Clone, Debug, PartialEq)]
pub enum RuntimeValue {
    Primitive(Primitive),
    Object(ObjectValue),
    Function(Function),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Primitive {
    Nil,
    Boolean(bool),
    Integer(BigInt),
    Decimal(BigDecimal),
    String(String),
    Character(char),
    List(Vec<RuntimeValue>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ObjectValue {
    pub name: Option<String>,
    pub scope: Scope<RuntimeValue>,
}

#[derive(Clone)]
pub struct Function {
    pub name: String,
    pub definition: Definition,
}

#[derive(Clone)]
pub enum Definition {
    /// A built-in, backed by a host closure.
    Native(NativeFunction),
    /// A user `DEF`: its body plus the scope it closed over. Methods also
    /// carry the object their `this` binds to.
    User(Rc<UserFunction>),
}

pub type NativeFunction = Rc<dyn Fn(Vec<RuntimeValue>) -> Result<RuntimeValue>>;

pub struct UserFunction {
    pub parameters: Vec<String>,
    pub body: Vec<ast::Stmt>,
    pub closure: Scope<RuntimeValue>,
    pub this: Option<ObjectValue>,
}

impl Function {
    pub fn native(
        name: impl Into<String>,
        definition: impl Fn(Vec<RuntimeValue>) -> Result<RuntimeValue> + 'static,
    ) -> Function {
        Function {
            name: name.into(),
            definition: Definition::Native(Rc::new(definition)),
        }
    }
}

// Functions compare by name and definition identity; there is no
// meaningful structural equality for closures.
impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        let same_definition = match (&self.definition, &other.definition) {
            (Definition::Native(a), Definition::Native(b)) => Rc::ptr_eq(a, b),
            (Definition::User(a), Definition::User(b)) => Rc::ptr_eq(a, b),
            _ => false,
        };
        self.name == other.name && same_definition
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.definition {
            Definition::Native(_) => "native",
            Definition::User(_) => "user",
        };
        write!(f, "Function({}, {kind})", self.name)
    }
}

impl RuntimeValue {
    pub fn nil() -> RuntimeValue {
        RuntimeValue::Primitive(Primitive::Nil)
    }

    /// The user-facing printable form, as produced by the `print` native
    /// and by string concatenation coercion.
    pub fn print(&self) -> String {
        match self {
            RuntimeValue::Primitive(Primitive::Nil) => "NIL".into(),
            RuntimeValue::Primitive(Primitive::Boolean(true)) => "TRUE".into(),
            RuntimeValue::Primitive(Primitive::Boolean(false)) => "FALSE".into(),
            RuntimeValue::Primitive(Primitive::Integer(value)) => value.to_string(),
            RuntimeValue::Primitive(Primitive::Decimal(value)) => value.to_string(),
            RuntimeValue::Primitive(Primitive::String(value)) => value.clone(),
            RuntimeValue::Primitive(Primitive::Character(value)) => value.to_string(),
            RuntimeValue::Primitive(Primitive::List(elements)) => {
                let elements: Vec<_> = elements.iter().map(RuntimeValue::print).collect();
                format!("[{}]", elements.join(", "))
            }
            RuntimeValue::Object(object) => match &object.name {
                Some(name) => format!("Object {name}"),
                None => "Object".into(),
            },
            RuntimeValue::Function(function) => format!("Function {}", function.name),
        }
    }

    /// A short name for the value's kind, for error messages.
    fn kind(&self) -> &'static str {
        match self {
            RuntimeValue::Primitive(Primitive::Nil) => "Nil",
            RuntimeValue::Primitive(Primitive::Boolean(_)) => "Boolean",
            RuntimeValue::Primitive(Primitive::Integer(_)) => "Integer",
            RuntimeValue::Primitive(Primitive::Decimal(_)) => "Decimal",
            RuntimeValue::Primitive(Primitive::String(_)) => "String",
            RuntimeValue::Primitive(Primitive::Character(_)) => "Character",
            RuntimeValue::Primitive(Primitive::List(_)) => "List",
            RuntimeValue::Object(_) => "Object",
            RuntimeValue::Function(_) => "Function",
        }
    }
}

/// Statement outcome: either fall through with the statement's value, or
/// unwind a `RETURN` to the nearest enclosing function call.
enum Flow {
    Next(RuntimeValue),
    Return(RuntimeValue),
}

struct Evaluator {
    scope: Scope<RuntimeValue>,
}

impl Evaluator {
    fn evaluate_source(&mut self, source: &ast::Source) -> Result<RuntimeValue> {
        match self.evaluate_block(&source.statements)? {
            Flow::Next(value) => Ok(value),
            Flow::Return(_) => Err(Error::ReturnOutsideFunction),
        }
    }

    /// Runs statements sequentially in the current scope. The block's
    /// value is the last statement's value.
    fn evaluate_block(&mut self, statements: &[ast::Stmt]) -> Result<Flow> {
        let mut value = RuntimeValue::nil();
        for statement in statements {
            match self.evaluate_stmt(statement)? {
                Flow::Next(v) => value = v,
                flow @ Flow::Return(_) => return Ok(flow),
            }
        }
        Ok(Flow::Next(value))
    }

    fn evaluate_stmt(&mut self, stmt: &ast::Stmt) -> Result<Flow> {
        match stmt {
            ast::Stmt::Let(stmt) => self.evaluate_let(stmt).map(Flow::Next),
            ast::Stmt::Def(stmt) => self.evaluate_def(stmt).map(Flow::Next),
            ast::Stmt::If(stmt) => self.evaluate_if(stmt),
            ast::Stmt::For(stmt) => self.evaluate_for(stmt),
            ast::Stmt::Return(stmt) => {
                let value = match &stmt.value {
                    Some(expr) => self.evaluate_expr(expr)?,
                    None => RuntimeValue::nil(),
                };
                Ok(Flow::Return(value))
            }
            ast::Stmt::Expression(stmt) => self.evaluate_expr(&stmt.expression).map(Flow::Next),
            ast::Stmt::Assignment(stmt) => self.evaluate_assignment(stmt).map(Flow::Next),
        }
    }

    fn evaluate_let(&mut self, stmt: &ast::Let) -> Result<RuntimeValue> {
        if self.scope.get(&stmt.name, true).is_some() {
            return Err(Error::AlreadyDefined(stmt.name.clone()));
        }
        let value = match &stmt.value {
            Some(expr) => self.evaluate_expr(expr)?,
            None => RuntimeValue::nil(),
        };
        self.scope
            .define(&stmt.name, value.clone())
            .expect("absence checked above");
        Ok(value)
    }

    fn evaluate_def(&mut self, stmt: &ast::Def) -> Result<RuntimeValue> {
        if self.scope.get(&stmt.name, true).is_some() {
            return Err(Error::AlreadyDefined(stmt.name.clone()));
        }
        for (index, name) in stmt.parameters.iter().enumerate() {
            if stmt.parameters[..index].contains(name) {
                return Err(Error::DuplicateParameter(name.clone()));
            }
        }

        // The closure captures the defining scope: static scoping.
        let function = Function {
            name: stmt.name.clone(),
            definition: Definition::User(Rc::new(UserFunction {
                parameters: stmt.parameters.clone(),
                body: stmt.body.clone(),
                closure: self.scope.clone(),
                this: None,
            })),
        };
        let value = RuntimeValue::Function(function);
        self.scope
            .define(&stmt.name, value.clone())
            .expect("absence checked above");
        Ok(value)
    }

    fn evaluate_if(&mut self, stmt: &ast::If) -> Result<Flow> {
        let condition = self.evaluate_expr(&stmt.condition)?;
        let kind = condition.kind();
        let RuntimeValue::Primitive(Primitive::Boolean(condition)) = condition else {
            return Err(Error::ConditionNotBoolean(kind));
        };
        let branch = if condition {
            &stmt.then_body
        } else {
            &stmt.else_body
        };
        self.scoped(self.scope.child(), |this| this.evaluate_block(branch))
    }

    fn evaluate_for(&mut self, stmt: &ast::For) -> Result<Flow> {
        let iterable = self.evaluate_expr(&stmt.iterable)?;
        let kind = iterable.kind();
        let RuntimeValue::Primitive(Primitive::List(elements)) = iterable else {
            return Err(Error::NotIterable(kind));
        };

        for element in elements {
            let scope = self.scope.child();
            scope
                .define(&stmt.name, element)
                .expect("fresh frame");
            match self.scoped(scope, |this| this.evaluate_block(&stmt.body))? {
                Flow::Next(_) => {}
                flow @ Flow::Return(_) => return Ok(flow),
            }
        }
        Ok(Flow::Next(RuntimeValue::nil()))
    }

    fn evaluate_assignment(&mut self, stmt: &ast::Assignment) -> Result<RuntimeValue> {
        match &stmt.target {
            ast::Expr::Variable(name) => {
                if self.scope.get(name, false).is_none() {
                    return Err(Error::Undefined(name.clone()));
                }
                let value = self.evaluate_expr(&stmt.value)?;
                self.scope
                    .set(name, value.clone())
                    .expect("presence checked above");
                Ok(value)
            }
            ast::Expr::Property { receiver, name } => {
                let receiver = self.evaluate_expr(receiver)?;
                let kind = receiver.kind();
                let RuntimeValue::Object(object) = receiver else {
                    return Err(Error::NotAnObject(kind));
                };
                // Membership first: `set` walks parent frames, and an
                // object's members are a closed set.
                if object.scope.get(name, true).is_none() {
                    return Err(Error::UndefinedMember(name.clone()));
                }
                let value = self.evaluate_expr(&stmt.value)?;
                object
                    .scope
                    .set(name, value.clone())
                    .expect("presence checked above");
                Ok(value)
            }
            _ => Err(Error::InvalidAssignmentTarget),
        }
    }

    fn evaluate_expr(&mut self, expr: &ast::Expr) -> Result<RuntimeValue> {
        match expr {
            ast::Expr::Literal(literal) => Ok(RuntimeValue::Primitive(match literal {
                ast::Literal::Nil => Primitive::Nil,
                ast::Literal::Boolean(value) => Primitive::Boolean(*value),
                ast::Literal::Integer(value) => Primitive::Integer(value.clone()),
                ast::Literal::Decimal(value) => Primitive::Decimal(value.clone()),
                ast::Literal::String(value) => Primitive::String(value.clone()),
                ast::Literal::Character(value) => Primitive::Character(*value),
            })),
            ast::Expr::Group(inner) => self.evaluate_expr(inner),
            ast::Expr::Binary { op, left, right } => self.evaluate_binary(*op, left, right),
            ast::Expr::Variable(name) => self
                .scope
                .get(name, false)
                .ok_or_else(|| Error::Undefined(name.clone())),
            ast::Expr::Property { receiver, name } => {
                let receiver = self.evaluate_expr(receiver)?;
                let kind = receiver.kind();
                let RuntimeValue::Object(object) = receiver else {
                    return Err(Error::NotAnObject(kind));
                };
                object
                    .scope
                    .get(name, true)
                    .ok_or_else(|| Error::UndefinedMember(name.clone()))
            }
            ast::Expr::Function { name, arguments } => {
                let value = self
                    .scope
                    .get(name, false)
                    .ok_or_else(|| Error::Undefined(name.clone()))?;
                let RuntimeValue::Function(function) = value else {
                    return Err(Error::NotAFunction(name.clone()));
                };
                let arguments = self.evaluate_arguments(arguments)?;
                self.call(&function, arguments)
            }
            ast::Expr::Method {
                receiver,
                name,
                arguments,
            } => {
                let receiver = self.evaluate_expr(receiver)?;
                let kind = receiver.kind();
                let RuntimeValue::Object(object) = receiver else {
                    return Err(Error::NotAnObject(kind));
                };
                let member = object
                    .scope
                    .get(name, true)
                    .ok_or_else(|| Error::UndefinedMember(name.clone()))?;
                let RuntimeValue::Function(method) = member else {
                    return Err(Error::NotAFunction(name.clone()));
                };
                let arguments = self.evaluate_arguments(arguments)?;
                self.call(&method, arguments)
            }
            ast::Expr::ObjectExpr(object) => self.evaluate_object(object),
        }
    }

    fn evaluate_arguments(&mut self, arguments: &[ast::Expr]) -> Result<Vec<RuntimeValue>> {
        arguments
            .iter()
            .map(|argument| self.evaluate_expr(argument))
            .collect()
    }

    /// Invokes a function value with already-evaluated arguments.
    fn call(&mut self, function: &Function, arguments: Vec<RuntimeValue>) -> Result<RuntimeValue> {
        let user = match &function.definition {
            Definition::Native(native) => return native(arguments),
            Definition::User(user) => user,
        };

        if arguments.len() != user.parameters.len() {
            return Err(Error::ArityMismatch {
                name: function.name.clone(),
                expected: user.parameters.len(),
                actual: arguments.len(),
            });
        }

        let call_scope = user.closure.child();
        if let Some(this) = &user.this {
            call_scope
                .define("this", RuntimeValue::Object(this.clone()))
                .expect("fresh frame");
        }
        for (parameter, argument) in user.parameters.iter().zip(arguments) {
            call_scope
                .define(parameter, argument)
                .map_err(|()| Error::AlreadyDefined(parameter.clone()))?;
        }

        let flow = self.scoped(call_scope, |this| this.evaluate_block(&user.body))?;
        Ok(match flow {
            // A function without RETURN yields Nil.
            Flow::Next(_) => RuntimeValue::nil(),
            Flow::Return(value) => value,
        })
    }

    fn evaluate_object(&mut self, object: &ast::ObjectExpr) -> Result<RuntimeValue> {
        // The object scope chains to the current scope, so field
        // initializers see both the enclosing bindings and earlier fields.
        let members = self.scope.child();

        self.scoped(members.clone(), |this| {
            for field in &object.fields {
                let value = match &field.value {
                    Some(expr) => this.evaluate_expr(expr)?,
                    None => RuntimeValue::nil(),
                };
                members
                    .define(&field.name, value)
                    .map_err(|()| Error::DuplicateMember(field.name.clone()))?;
            }
            Ok(())
        })?;

        let value = ObjectValue {
            name: object.name.clone(),
            scope: members.clone(),
        };

        for method in &object.methods {
            for (index, name) in method.parameters.iter().enumerate() {
                if method.parameters[..index].contains(name) {
                    return Err(Error::DuplicateParameter(name.clone()));
                }
            }
            let function = Function {
                name: method.name.clone(),
                definition: Definition::User(Rc::new(UserFunction {
                    parameters: method.parameters.clone(),
                    body: method.body.clone(),
                    closure: members.clone(),
                    this: Some(value.clone()),
                })),
            };
            members
                .define(&method.name, RuntimeValue::Function(function))
                .map_err(|()| Error::DuplicateMember(method.name.clone()))?;
        }

        Ok(RuntimeValue::Object(value))
    }

    fn evaluate_binary(
        &mut self,
        op: ast::BinaryOp,
        left: &ast::Expr,
        right: &ast::Expr,
    ) -> Result<RuntimeValue> {
        use ast::BinaryOp::*;
        use Primitive::*;

        // AND/OR short-circuit: the right operand is only evaluated when
        // the left does not decide the result.
        if let And | Or = op {
            let left = self.evaluate_expr(left)?;
            let RuntimeValue::Primitive(Boolean(left)) = left else {
                return Err(Error::LogicalOperandNotBoolean { op: op.literal() });
            };
            match (op, left) {
                (And, false) => return Ok(RuntimeValue::Primitive(Boolean(false))),
                (Or, true) => return Ok(RuntimeValue::Primitive(Boolean(true))),
                _ => {}
            }
            let right = self.evaluate_expr(right)?;
            let RuntimeValue::Primitive(Boolean(right)) = right else {
                return Err(Error::LogicalOperandNotBoolean { op: op.literal() });
            };
            return Ok(RuntimeValue::Primitive(Boolean(right)));
        }

        let left = self.evaluate_expr(left)?;
        let right = self.evaluate_expr(right)?;

        // Value equality, not identity.
        if let Eq | Ne = op {
            let equal = left == right;
            return Ok(RuntimeValue::Primitive(Boolean(equal == (op == Eq))));
        }

        // Concatenation as soon as either side is a string; the other side
        // is coerced through its printable form.
        if op == Add {
            if let (RuntimeValue::Primitive(String(_)), _) | (_, RuntimeValue::Primitive(String(_))) =
                (&left, &right)
            {
                return Ok(RuntimeValue::Primitive(String(left.print() + &right.print())));
            }
        }

        let wrong_operands = || Error::WrongOperands {
            op: op.literal(),
            left: left.kind(),
            right: right.kind(),
        };

        match (&left, &right) {
            (RuntimeValue::Primitive(Integer(l)), RuntimeValue::Primitive(Integer(r))) => {
                Ok(RuntimeValue::Primitive(match op {
                    Add => Integer(l + r),
                    Sub => Integer(l - r),
                    Mul => Integer(l * r),
                    Div if r.is_zero() => return Err(Error::DivisionByZero),
                    Div => Integer(l / r),
                    Lt => Boolean(l < r),
                    Le => Boolean(l <= r),
                    Gt => Boolean(l > r),
                    Ge => Boolean(l >= r),
                    _ => unreachable!("handled above"),
                }))
            }
            (RuntimeValue::Primitive(Decimal(l)), RuntimeValue::Primitive(Decimal(r))) => {
                Ok(RuntimeValue::Primitive(match op {
                    Add => Decimal(l + r),
                    Sub => Decimal(l - r),
                    Mul => Decimal(l * r),
                    Div => Decimal(divide_decimals(l, r)?),
                    Lt => Boolean(l < r),
                    Le => Boolean(l <= r),
                    Gt => Boolean(l > r),
                    Ge => Boolean(l >= r),
                    _ => unreachable!("handled above"),
                }))
            }
            _ => Err(wrong_operands()),
        }
    }

    fn scoped<T>(&mut self, scope: Scope<RuntimeValue>, f: impl FnOnce(&mut Self) -> T) -> T {
        let saved = std::mem::replace(&mut self.scope, scope);
        let result = f(self);
        self.scope = saved;
        result
    }
}

/// Division of decimals: the quotient keeps the dividend's scale and is
/// rounded half-to-even, matching the transpilation target's
/// `divide(d, RoundingMode.HALF_EVEN)`.
fn divide_decimals(l: &BigDecimal, r: &BigDecimal) -> Result<BigDecimal> {
    if r.is_zero() {
        return Err(Error::DivisionByZero);
    }
    let scale = l.fractional_digit_count();
    Ok((l / r).with_scale_round(scale, RoundingMode::HalfEven))
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("'{0}' is not defined")]
    Undefined(String),
    #[error("'{0}' is already defined in this scope")]
    AlreadyDefined(String),
    #[error("duplicate parameter name '{0}'")]
    DuplicateParameter(String),
    #[error("duplicate member name '{0}'")]
    DuplicateMember(String),
    #[error("'{name}' expects {expected} arguments, got {actual}")]
    ArityMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("cannot apply '{op}' to {left} and {right}")]
    WrongOperands {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },
    #[error("operands to '{op}' must be booleans")]
    LogicalOperandNotBoolean { op: &'static str },
    #[error("if condition must be a boolean, got {0}")]
    ConditionNotBoolean(&'static str),
    #[error("division by zero")]
    DivisionByZero,
    #[error("loop expression must be a list, got {0}")]
    NotIterable(&'static str),
    #[error("receiver is not an object, got {0}")]
    NotAnObject(&'static str),
    #[error("'{0}' is not defined on the object")]
    UndefinedMember(String),
    #[error("'{0}' is not a function")]
    NotAFunction(String),
    #[error("invalid assignment target")]
    InvalidAssignmentTarget,
    #[error("cannot return outside of a function")]
    ReturnOutsideFunction,
    #[error("range start {start} exceeds end {end}")]
    RangeStartExceedsEnd { start: BigInt, end: BigInt },
    #[error("range arguments must be integers")]
    RangeArgumentsNotIntegers,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        environment::{self, Output},
        lexer, parser,
    };
    use pretty_assertions::assert_eq;

    /// Evaluates the program against a fresh environment, returning its
    /// value and everything it printed.
    fn run(input: &str) -> (Result<RuntimeValue>, String) {
        let output = Output::capture();
        let scope = environment::scope(&output);
        let source = parser::parse(lexer::lex(input).unwrap()).unwrap();
        let value = evaluate(&source, scope);
        (value, output.contents())
    }

    fn printed(input: &str) -> String {
        let (value, output) = run(input);
        value.unwrap();
        output
    }

    fn int(value: i64) -> RuntimeValue {
        RuntimeValue::Primitive(Primitive::Integer(BigInt::from(value)))
    }

    #[test]
    fn arithmetic_and_let() {
        assert_eq!(printed("LET x = 1 + 2; print(x);"), "3\n");
        assert_eq!(printed("print(2 * 3 + 4);"), "10\n");
        assert_eq!(printed("print(7 / 2);"), "3\n");
        assert_eq!(printed("print(7 - 2 - 1);"), "4\n");
    }

    #[test]
    fn assignment_updates_the_defining_frame() {
        assert_eq!(printed("LET x: Integer = 1; x = 2; print(x);"), "2\n");
        assert_eq!(
            printed("LET x = 1; IF TRUE DO x = 5; END print(x);"),
            "5\n",
        );
        let (value, _) = run("x = 1;");
        assert_eq!(value.unwrap_err(), Error::Undefined("x".into()));
    }

    #[test]
    fn function_definition_and_call() {
        assert_eq!(printed("DEF f(n) DO RETURN n + 1; END print(f(41));"), "42\n");
        let (value, _) = run("DEF f(a, b) DO END f(1);");
        assert_eq!(
            value.unwrap_err(),
            Error::ArityMismatch {
                name: "f".into(),
                expected: 2,
                actual: 1,
            },
        );
        // Without a RETURN the call yields NIL.
        assert_eq!(printed("DEF f() DO 1; END print(f());"), "NIL\n");
    }

    #[test]
    fn closures_use_static_scoping() {
        assert_eq!(
            printed(
                "LET x = 1;
                 DEF get() DO RETURN x; END
                 DEF wrap() DO LET x = 99; RETURN get(); END
                 print(wrap());",
            ),
            "1\n",
        );
    }

    #[test]
    fn return_unwinds_to_the_nearest_call() {
        assert_eq!(
            printed(
                "DEF f() DO
                     FOR i IN range(0, 10) DO
                         IF i == 3 DO RETURN i; END
                     END
                     RETURN 99;
                 END
                 print(f());",
            ),
            "3\n",
        );
    }

    #[test]
    fn return_at_the_top_level_is_an_error() {
        let (value, _) = run("RETURN 1;");
        assert_eq!(value.unwrap_err(), Error::ReturnOutsideFunction);
    }

    #[test]
    fn if_branches() {
        assert_eq!(printed("IF 1 == 1 DO print(1); ELSE print(2); END"), "1\n");
        assert_eq!(printed("IF 1 == 2 DO print(1); ELSE print(2); END"), "2\n");
        let (value, _) = run("IF 1 DO END");
        assert_eq!(value.unwrap_err(), Error::ConditionNotBoolean("Integer"));
    }

    #[test]
    fn for_iterates_a_list() {
        assert_eq!(printed("FOR i IN range(0, 3) DO print(i); END"), "0\n1\n2\n");
        assert_eq!(printed("FOR x IN list(5, 7) DO print(x); END"), "5\n7\n");
        let (value, _) = run("FOR i IN 1 DO END");
        assert_eq!(value.unwrap_err(), Error::NotIterable("Integer"));
    }

    #[test]
    fn each_iteration_gets_a_fresh_scope() {
        assert_eq!(
            printed("FOR i IN range(0, 2) DO LET x = i; print(x); END"),
            "0\n1\n",
        );
    }

    #[test]
    fn string_concatenation_coerces_via_print() {
        let (value, output) = run(r#"LET s = "a" + 1;"#);
        assert_eq!(output, "");
        assert_eq!(
            value.unwrap(),
            RuntimeValue::Primitive(Primitive::String("a1".into())),
        );
        assert_eq!(printed(r#"print(1 + "a");"#), "1a\n");
        assert_eq!(printed(r#"print("x" + NIL);"#), "xNIL\n");
        assert_eq!(printed(r#"print("b" + 1.5);"#), "b1.5\n");
    }

    #[test]
    fn arithmetic_requires_matching_numeric_kinds() {
        let (value, _) = run("1 + 1.5;");
        assert_eq!(
            value.unwrap_err(),
            Error::WrongOperands {
                op: "+",
                left: "Integer",
                right: "Decimal",
            },
        );
        let (value, _) = run("TRUE - FALSE;");
        assert_eq!(
            value.unwrap_err(),
            Error::WrongOperands {
                op: "-",
                left: "Boolean",
                right: "Boolean",
            },
        );
    }

    #[test]
    fn division_by_zero() {
        let (value, _) = run("1 / 0;");
        assert_eq!(value.unwrap_err(), Error::DivisionByZero);
        let (value, _) = run("1.0 / 0.0;");
        assert_eq!(value.unwrap_err(), Error::DivisionByZero);
    }

    #[test]
    fn decimal_division_rounds_half_even() {
        // Exact quotients keep the dividend's scale.
        assert_eq!(printed("print(7.0 / 2.0);"), "3.5\n");
        // 1.0/4.0 = 0.25: the half rounds to the even neighbor 0.2;
        // 3.0/4.0 = 0.75 rounds up to 0.8.
        assert_eq!(printed("print(1.0 / 4.0);"), "0.2\n");
        assert_eq!(printed("print(3.0 / 4.0);"), "0.8\n");
        assert_eq!(printed("print(1.00 / 3.00);"), "0.33\n");
    }

    #[test]
    fn comparisons_and_equality() {
        assert_eq!(printed("print(1 < 2); print(2 <= 1);"), "TRUE\nFALSE\n");
        assert_eq!(printed("print(1.5 > 0.5); print(1 >= 1);"), "TRUE\nTRUE\n");
        assert_eq!(printed("print(1 == 1); print(1 != 1);"), "TRUE\nFALSE\n");
        assert_eq!(printed(r#"print("a" == "a");"#), "TRUE\n");
        assert_eq!(printed(r#"print(1 == "1");"#), "FALSE\n");
    }

    #[test]
    fn logical_operators_short_circuit() {
        // log both prints and returns its argument, so it makes evaluation
        // of the right operand observable.
        assert_eq!(printed("FALSE AND log(TRUE);"), "");
        assert_eq!(printed("TRUE OR log(FALSE);"), "");
        assert_eq!(printed("TRUE AND log(TRUE);"), "log: TRUE\n");
        assert_eq!(printed("FALSE OR log(FALSE);"), "log: FALSE\n");
        assert_eq!(printed("print(TRUE AND FALSE); print(FALSE OR TRUE);"), "FALSE\nTRUE\n");
    }

    #[test]
    fn objects_fields_and_methods() {
        assert_eq!(
            printed(
                "LET o = OBJECT DO
                     LET a = 1;
                     LET b = a + 1;
                     DEF get() DO RETURN this.b; END
                 END
                 print(o.a);
                 print(o.b);
                 print(o.get());",
            ),
            "1\n2\n2\n",
        );
    }

    #[test]
    fn property_assignment_mutates_the_object() {
        assert_eq!(
            printed(
                "LET o = OBJECT DO
                     LET n = 1;
                     DEF get() DO RETURN this.n; END
                 END
                 o.n = 5;
                 print(o.get());",
            ),
            "5\n",
        );
        let (value, _) = run("LET o = OBJECT DO END o.missing = 1;");
        assert_eq!(value.unwrap_err(), Error::UndefinedMember("missing".into()));
    }

    #[test]
    fn methods_bind_this_to_their_object() {
        assert_eq!(
            printed(
                "LET a = OBJECT DO
                     LET n = 1;
                     DEF get() DO RETURN this.n; END
                 END
                 LET b = OBJECT DO
                     LET n = 2;
                     DEF get() DO RETURN this.n; END
                 END
                 print(a.get());
                 print(b.get());",
            ),
            "1\n2\n",
        );
    }

    #[test]
    fn non_object_receivers_are_rejected() {
        let (value, _) = run("1 .p;");
        assert_eq!(value.unwrap_err(), Error::NotAnObject("Integer"));
        let (value, _) = run("variable.m();");
        assert_eq!(value.unwrap_err(), Error::NotAnObject("String"));
    }

    #[test]
    fn duplicate_definitions_are_rejected() {
        let (value, _) = run("LET x = 1; LET x = 2;");
        assert_eq!(value.unwrap_err(), Error::AlreadyDefined("x".into()));
        let (value, _) = run("DEF f(a, a) DO END");
        assert_eq!(value.unwrap_err(), Error::DuplicateParameter("a".into()));
        let (value, _) = run("OBJECT DO LET n = 1; DEF n() DO END END;");
        assert_eq!(value.unwrap_err(), Error::DuplicateMember("n".into()));
    }

    #[test]
    fn source_yields_the_last_statement_value() {
        let (value, _) = run("1; 2; 3;");
        assert_eq!(value.unwrap(), int(3));
        let (value, _) = run("");
        assert_eq!(value.unwrap(), RuntimeValue::nil());
    }

    #[test]
    fn calling_a_non_function_fails() {
        let (value, _) = run("variable(1);");
        assert_eq!(value.unwrap_err(), Error::NotAFunction("variable".into()));
        let (value, _) = run("missing(1);");
        assert_eq!(value.unwrap_err(), Error::Undefined("missing".into()));
    }
}
