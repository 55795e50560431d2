use crate::{
    ast,
    ir,
    scope::Scope,
    types::Type,
};

type Result<T, E = Error> = std::result::Result<T, E>;

/// Analyzer-private sentinel carrying the enclosing function's declared
/// return type. Not a lexable identifier, so user code can never collide
/// with it.
const RETURNS: &str = "$RETURNS";

/// Checks the source against the subtype lattice and scope rules,
/// producing the typed IR.
///
/// The injected root scope provides the native bindings (see
/// [`environment`]); the analyzer defines top-level names directly into
/// it.
pub fn analyze(source: &ast::Source, scope: Scope<Type>) -> Result<ir::Source> {
    Analyzer { scope }.analyze_source(source)
}

/// The default analysis environment: the ten native type names plus the
/// typed forms of the evaluator's natives and testing fixtures.
pub fn environment() -> Scope<Type> {
    let scope = Scope::root();
    let define = |name: &str, ty: Type| {
        scope.define(name, ty).expect("fresh environment scope");
    };

    for name in [
        "Nil",
        "Boolean",
        "Integer",
        "Decimal",
        "String",
        "Character",
        "Any",
        "Equatable",
        "Comparable",
        "Iterable",
    ] {
        define(name, Type::from_name(name).expect("native type name"));
    }

    define("debug", Type::function(vec![Type::Any], Type::Nil));
    define("print", Type::function(vec![Type::Any], Type::Nil));
    define("log", Type::function(vec![Type::Any], Type::Any));
    define("list", Type::function(vec![Type::Any], Type::Iterable));
    define(
        "range",
        Type::function(vec![Type::Integer, Type::Integer], Type::Iterable),
    );

    define("variable", Type::String);
    define("function", Type::function(vec![Type::Any], Type::Any));
    let members = Scope::root();
    members.define("property", Type::String).expect("fresh scope");
    members
        .define("method", Type::function(vec![Type::Any], Type::Any))
        .expect("fresh scope");
    define("object", Type::object(members));

    scope
}

/// Fails unless `actual <: expected` under the fixed lattice.
pub fn require_subtype(actual: &Type, expected: &Type) -> Result<()> {
    if actual.is_subtype_of(expected) {
        Ok(())
    } else {
        Err(Error::NotSubtype {
            actual: actual.clone(),
            expected: expected.clone(),
        })
    }
}

struct Analyzer {
    scope: Scope<Type>,
}

impl Analyzer {
    fn analyze_source(&mut self, source: &ast::Source) -> Result<ir::Source> {
        let statements = source
            .statements
            .iter()
            .map(|stmt| self.analyze_stmt(stmt))
            .collect::<Result<_>>()?;
        Ok(ir::Source { statements })
    }

    fn analyze_stmt(&mut self, stmt: &ast::Stmt) -> Result<ir::Stmt> {
        Ok(match stmt {
            ast::Stmt::Let(stmt) => ir::Stmt::Let(self.analyze_let(stmt)?),
            ast::Stmt::Def(stmt) => ir::Stmt::Def(self.analyze_def(stmt)?),
            ast::Stmt::If(stmt) => ir::Stmt::If(self.analyze_if(stmt)?),
            ast::Stmt::For(stmt) => ir::Stmt::For(self.analyze_for(stmt)?),
            ast::Stmt::Return(stmt) => ir::Stmt::Return(self.analyze_return(stmt)?),
            ast::Stmt::Expression(stmt) => ir::Stmt::Expression(ir::Expression {
                expression: self.analyze_expr(&stmt.expression)?,
            }),
            ast::Stmt::Assignment(stmt) => ir::Stmt::Assignment(self.analyze_assignment(stmt)?),
        })
    }

    fn analyze_let(&mut self, stmt: &ast::Let) -> Result<ir::Let> {
        if self.scope.get(&stmt.name, true).is_some() {
            return Err(Error::AlreadyDefined(stmt.name.clone()));
        }

        let declared = match &stmt.ty {
            Some(name) => Some(resolve_type(name)?),
            None => None,
        };
        let value = match &stmt.value {
            Some(expr) => Some(self.analyze_expr(expr)?),
            None => None,
        };

        // Declared type wins; otherwise infer from the value; otherwise Any.
        let ty = match (&declared, &value) {
            (Some(declared), _) => declared.clone(),
            (None, Some(value)) => value.ty().clone(),
            (None, None) => Type::Any,
        };
        if let Some(value) = &value {
            require_subtype(value.ty(), &ty)?;
        }

        self.scope
            .define(&stmt.name, ty.clone())
            .expect("absence checked above");
        Ok(ir::Let {
            name: stmt.name.clone(),
            ty,
            value,
        })
    }

    fn analyze_def(&mut self, stmt: &ast::Def) -> Result<ir::Def> {
        if self.scope.get(&stmt.name, true).is_some() {
            return Err(Error::AlreadyDefined(stmt.name.clone()));
        }
        // Quadratic, but arities are tiny.
        for (index, name) in stmt.parameters.iter().enumerate() {
            if stmt.parameters[..index].contains(name) {
                return Err(Error::DuplicateParameter(name.clone()));
            }
        }

        let parameters = resolve_parameters(stmt, false)?;
        let returns = match &stmt.return_type {
            Some(name) => resolve_type(name)?,
            None => Type::Any,
        };

        // The function is bound before its body is analyzed so that it can
        // recurse.
        let parameter_types = parameters.iter().map(|p| p.ty.clone()).collect();
        self.scope
            .define(&stmt.name, Type::function(parameter_types, returns.clone()))
            .expect("absence checked above");

        let body_scope = self.scope.child();
        for parameter in &parameters {
            body_scope
                .define(&parameter.name, parameter.ty.clone())
                .expect("parameter names are unique");
        }
        body_scope
            .define(RETURNS, returns.clone())
            .expect("fresh frame");
        let body = self.scoped(body_scope, |this| {
            stmt.body
                .iter()
                .map(|stmt| this.analyze_stmt(stmt))
                .collect::<Result<_>>()
        })?;

        Ok(ir::Def {
            name: stmt.name.clone(),
            parameters,
            returns,
            body,
        })
    }

    fn analyze_if(&mut self, stmt: &ast::If) -> Result<ir::If> {
        let condition = self.analyze_expr(&stmt.condition)?;
        if *condition.ty() != Type::Boolean {
            return Err(Error::ConditionNotBoolean(condition.ty().clone()));
        }

        let then_body = self.scoped(self.scope.child(), |this| {
            stmt.then_body
                .iter()
                .map(|stmt| this.analyze_stmt(stmt))
                .collect::<Result<_>>()
        })?;
        let else_body = self.scoped(self.scope.child(), |this| {
            stmt.else_body
                .iter()
                .map(|stmt| this.analyze_stmt(stmt))
                .collect::<Result<_>>()
        })?;

        Ok(ir::If {
            condition,
            then_body,
            else_body,
        })
    }

    fn analyze_for(&mut self, stmt: &ast::For) -> Result<ir::For> {
        let iterable = self.analyze_expr(&stmt.iterable)?;
        require_subtype(iterable.ty(), &Type::Iterable)?;

        let body_scope = self.scope.child();
        // Iteration yields integers, so the loop variable is one.
        body_scope
            .define(&stmt.name, Type::Integer)
            .expect("fresh frame");
        let body = self.scoped(body_scope, |this| {
            stmt.body
                .iter()
                .map(|stmt| this.analyze_stmt(stmt))
                .collect::<Result<_>>()
        })?;

        Ok(ir::For {
            name: stmt.name.clone(),
            ty: Type::Integer,
            iterable,
            body,
        })
    }

    fn analyze_return(&mut self, stmt: &ast::Return) -> Result<ir::Return> {
        let expected = self
            .scope
            .get(RETURNS, false)
            .ok_or(Error::ReturnOutsideFunction)?;

        let value = match &stmt.value {
            Some(expr) => self.analyze_expr(expr)?,
            None => ir::Expr::Literal {
                value: ast::Literal::Nil,
                ty: Type::Nil,
            },
        };
        require_subtype(value.ty(), &expected)?;

        Ok(ir::Return { value: Some(value) })
    }

    fn analyze_assignment(&mut self, stmt: &ast::Assignment) -> Result<ir::Assignment> {
        match &stmt.target {
            ast::Expr::Variable(name) => {
                let variable = self.analyze_variable(name)?;
                let value = self.analyze_expr(&stmt.value)?;
                require_subtype(value.ty(), &variable.ty)?;
                Ok(ir::Assignment::Variable { variable, value })
            }
            ast::Expr::Property { receiver, name } => {
                let property = self.analyze_property(receiver, name)?;
                let value = self.analyze_expr(&stmt.value)?;
                require_subtype(value.ty(), &property.ty)?;
                Ok(ir::Assignment::Property { property, value })
            }
            _ => Err(Error::InvalidAssignmentTarget),
        }
    }

    fn analyze_expr(&mut self, expr: &ast::Expr) -> Result<ir::Expr> {
        match expr {
            ast::Expr::Literal(literal) => Ok(ir::Expr::Literal {
                value: literal.clone(),
                ty: literal_type(literal),
            }),
            ast::Expr::Group(inner) => {
                let inner = self.analyze_expr(inner)?;
                Ok(ir::Expr::Group(Box::new(inner)))
            }
            ast::Expr::Binary { op, left, right } => self.analyze_binary(*op, left, right),
            ast::Expr::Variable(name) => self.analyze_variable(name).map(ir::Expr::Variable),
            ast::Expr::Property { receiver, name } => {
                self.analyze_property(receiver, name).map(ir::Expr::Property)
            }
            ast::Expr::Function { name, arguments } => self.analyze_function(name, arguments),
            ast::Expr::Method {
                receiver,
                name,
                arguments,
            } => self.analyze_method(receiver, name, arguments),
            ast::Expr::ObjectExpr(object) => self.analyze_object(object).map(ir::Expr::ObjectExpr),
        }
    }

    fn analyze_binary(
        &mut self,
        op: ast::BinaryOp,
        left: &ast::Expr,
        right: &ast::Expr,
    ) -> Result<ir::Expr> {
        use ast::BinaryOp::*;

        let left = self.analyze_expr(left)?;
        let right = self.analyze_expr(right)?;

        let ty = match op {
            // `+` is concatenation as soon as either side is a string;
            // otherwise it behaves like the other arithmetic operators.
            Add if *left.ty() == Type::String || *right.ty() == Type::String => {
                require_subtype(left.ty(), &Type::Equatable)?;
                require_subtype(right.ty(), &Type::Equatable)?;
                Type::String
            }
            Add | Sub | Mul | Div => {
                require_subtype(left.ty(), &Type::Comparable)?;
                require_subtype(right.ty(), &Type::Comparable)?;
                require_same_operands(op, &left, &right)?;
                left.ty().clone()
            }
            Lt | Le | Gt | Ge => {
                require_subtype(left.ty(), &Type::Comparable)?;
                require_subtype(right.ty(), &Type::Comparable)?;
                require_same_operands(op, &left, &right)?;
                Type::Boolean
            }
            Eq | Ne => {
                require_subtype(left.ty(), &Type::Equatable)?;
                require_subtype(right.ty(), &Type::Equatable)?;
                require_same_operands(op, &left, &right)?;
                Type::Boolean
            }
            And | Or => {
                if *left.ty() != Type::Boolean || *right.ty() != Type::Boolean {
                    return Err(Error::LogicalOperandNotBoolean { op: op.literal() });
                }
                Type::Boolean
            }
        };

        Ok(ir::Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            ty,
        })
    }

    fn analyze_variable(&mut self, name: &str) -> Result<ir::Variable> {
        let ty = self
            .scope
            .get(name, false)
            .ok_or_else(|| Error::Undefined(name.to_string()))?;
        Ok(ir::Variable {
            name: name.to_string(),
            ty,
        })
    }

    fn analyze_property(&mut self, receiver: &ast::Expr, name: &str) -> Result<ir::Property> {
        let receiver = self.analyze_expr(receiver)?;
        let Type::Object(object) = receiver.ty() else {
            return Err(Error::NotAnObject(receiver.ty().clone()));
        };
        // Members form a closed set, hence the current-frame-only lookup.
        let ty = object
            .scope
            .get(name, true)
            .ok_or_else(|| Error::UndefinedMember(name.to_string()))?;
        Ok(ir::Property {
            receiver: Box::new(receiver),
            name: name.to_string(),
            ty,
        })
    }

    fn analyze_function(&mut self, name: &str, arguments: &[ast::Expr]) -> Result<ir::Expr> {
        let ty = self
            .scope
            .get(name, false)
            .ok_or_else(|| Error::Undefined(name.to_string()))?;
        let Type::Function(function) = ty else {
            return Err(Error::NotAFunction(name.to_string()));
        };

        let arguments = self.analyze_arguments(name, arguments, &function.parameters)?;
        Ok(ir::Expr::Function {
            name: name.to_string(),
            arguments,
            ty: *function.returns,
        })
    }

    fn analyze_method(
        &mut self,
        receiver: &ast::Expr,
        name: &str,
        arguments: &[ast::Expr],
    ) -> Result<ir::Expr> {
        let receiver = self.analyze_expr(receiver)?;
        let Type::Object(object) = receiver.ty() else {
            return Err(Error::NotAnObject(receiver.ty().clone()));
        };
        let member = object
            .scope
            .get(name, true)
            .ok_or_else(|| Error::UndefinedMember(name.to_string()))?;
        let Type::Function(method) = member else {
            return Err(Error::NotAFunction(name.to_string()));
        };

        let arguments = self.analyze_arguments(name, arguments, &method.parameters)?;
        Ok(ir::Expr::Method {
            receiver: Box::new(receiver),
            name: name.to_string(),
            arguments,
            ty: *method.returns,
        })
    }

    fn analyze_arguments(
        &mut self,
        name: &str,
        arguments: &[ast::Expr],
        parameters: &[Type],
    ) -> Result<Vec<ir::Expr>> {
        if arguments.len() != parameters.len() {
            return Err(Error::ArityMismatch {
                name: name.to_string(),
                expected: parameters.len(),
                actual: arguments.len(),
            });
        }
        arguments
            .iter()
            .zip(parameters)
            .map(|(argument, parameter)| {
                let argument = self.analyze_expr(argument)?;
                require_subtype(argument.ty(), parameter)?;
                Ok(argument)
            })
            .collect()
    }

    fn analyze_object(&mut self, object: &ast::ObjectExpr) -> Result<ir::ObjectExpr> {
        if let Some(name) = &object.name {
            if Type::from_name(name).is_some() {
                return Err(Error::ObjectNameIsNativeType(name.clone()));
            }
        }

        // The member scope is parentless: an object's members are a closed
        // set, not a view into the enclosing scope.
        let members = Scope::root();

        let mut fields = Vec::with_capacity(object.fields.len());
        for field in &object.fields {
            let value = match &field.value {
                Some(expr) => Some(self.analyze_expr(expr)?),
                None => None,
            };
            let ty = match (&field.ty, &value) {
                (Some(name), _) => resolve_type(name)?,
                (None, Some(value)) => value.ty().clone(),
                (None, None) => return Err(Error::UntypedField(field.name.clone())),
            };
            if let Some(value) = &value {
                require_subtype(value.ty(), &ty)?;
            }
            if members.define(&field.name, ty.clone()).is_err() {
                return Err(Error::DuplicateMember(field.name.clone()));
            }
            fields.push(ir::Let {
                name: field.name.clone(),
                ty,
                value,
            });
        }

        let ty = Type::object(members.clone());

        // Method signatures are installed before any body is analyzed, so
        // methods can call themselves and each other.
        let mut signatures = Vec::with_capacity(object.methods.len());
        for method in &object.methods {
            for (index, name) in method.parameters.iter().enumerate() {
                if method.parameters[..index].contains(name) {
                    return Err(Error::DuplicateParameter(name.clone()));
                }
            }
            let parameters = resolve_parameters(method, true)?;
            let returns = match &method.return_type {
                Some(name) => resolve_type(name)?,
                None => Type::Any,
            };
            let parameter_types = parameters.iter().map(|p| p.ty.clone()).collect();
            let signature = Type::function(parameter_types, returns.clone());
            if members.define(&method.name, signature).is_err() {
                return Err(Error::DuplicateMember(method.name.clone()));
            }
            signatures.push((parameters, returns));
        }

        let mut methods = Vec::with_capacity(object.methods.len());
        for (method, (parameters, returns)) in object.methods.iter().zip(signatures) {
            let body_scope = members.child();
            body_scope
                .define("this", ty.clone())
                .expect("fresh frame");
            for parameter in &parameters {
                body_scope
                    .define(&parameter.name, parameter.ty.clone())
                    .expect("parameter names are unique");
            }
            body_scope
                .define(RETURNS, returns.clone())
                .expect("fresh frame");
            let body = self.scoped(body_scope, |this| {
                method
                    .body
                    .iter()
                    .map(|stmt| this.analyze_stmt(stmt))
                    .collect::<Result<_>>()
            })?;
            methods.push(ir::Def {
                name: method.name.clone(),
                parameters,
                returns,
                body,
            });
        }

        Ok(ir::ObjectExpr {
            name: object.name.clone(),
            fields,
            methods,
            ty,
        })
    }

    fn scoped<T>(&mut self, scope: Scope<Type>, f: impl FnOnce(&mut Self) -> T) -> T {
        let saved = std::mem::replace(&mut self.scope, scope);
        let result = f(self);
        self.scope = saved;
        result
    }
}

fn resolve_type(name: &str) -> Result<Type> {
    Type::from_name(name).ok_or_else(|| Error::UnknownType(name.to_string()))
}

/// Resolves a def's parameter annotations. Top-level functions default
/// missing annotations to `Any`; object methods require them.
fn resolve_parameters(def: &ast::Def, explicit_required: bool) -> Result<Vec<ir::Parameter>> {
    def.parameters
        .iter()
        .enumerate()
        .map(|(index, name)| {
            let annotation = def.parameter_types.get(index).and_then(Option::as_deref);
            let ty = match annotation {
                Some(annotation) => resolve_type(annotation)?,
                None if explicit_required => {
                    return Err(Error::UntypedMethodParameter(name.clone()));
                }
                None => Type::Any,
            };
            Ok(ir::Parameter {
                name: name.clone(),
                ty,
            })
        })
        .collect()
}

fn literal_type(literal: &ast::Literal) -> Type {
    match literal {
        ast::Literal::Nil => Type::Nil,
        ast::Literal::Boolean(_) => Type::Boolean,
        ast::Literal::Integer(_) => Type::Integer,
        ast::Literal::Decimal(_) => Type::Decimal,
        ast::Literal::String(_) => Type::String,
        ast::Literal::Character(_) => Type::Character,
    }
}

fn require_same_operands(op: ast::BinaryOp, left: &ir::Expr, right: &ir::Expr) -> Result<()> {
    if left.ty() == right.ty() {
        Ok(())
    } else {
        Err(Error::MismatchedOperands {
            op: op.literal(),
            left: left.ty().clone(),
            right: right.ty().clone(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("'{0}' is not defined")]
    Undefined(String),
    #[error("'{0}' is already defined in this scope")]
    AlreadyDefined(String),
    #[error("unknown type '{0}'")]
    UnknownType(String),
    #[error("duplicate parameter name '{0}'")]
    DuplicateParameter(String),
    #[error("duplicate member name '{0}'")]
    DuplicateMember(String),
    #[error("{actual} is not a subtype of {expected}")]
    NotSubtype { actual: Type, expected: Type },
    #[error("if condition must be Boolean, got {0}")]
    ConditionNotBoolean(Type),
    #[error("operands to '{op}' must be Boolean")]
    LogicalOperandNotBoolean { op: &'static str },
    #[error("operands to '{op}' must be of the same type, got {left} and {right}")]
    MismatchedOperands {
        op: &'static str,
        left: Type,
        right: Type,
    },
    #[error("cannot return outside of a function")]
    ReturnOutsideFunction,
    #[error("'{0}' is not a function")]
    NotAFunction(String),
    #[error("'{name}' expects {expected} arguments, got {actual}")]
    ArityMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("receiver must be an object, got {0}")]
    NotAnObject(Type),
    #[error("'{0}' is not defined on the object")]
    UndefinedMember(String),
    #[error("method parameter '{0}' must have a type")]
    UntypedMethodParameter(String),
    #[error("field '{0}' must have a type or a value")]
    UntypedField(String),
    #[error("object name '{0}' is a native type name")]
    ObjectNameIsNativeType(String),
    #[error("invalid assignment target")]
    InvalidAssignmentTarget,
}
