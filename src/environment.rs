use std::{cell::RefCell, rc::Rc};

use num_traits::One;

use crate::{
    evaluator::{Error, Function, ObjectValue, Primitive, RuntimeValue},
    scope::Scope,
};

type Result<T, E = Error> = std::result::Result<T, E>;

/// Where native print functions write.
///
/// The default writes through to stdout; [`Output::capture`] buffers
/// instead, which is how tests observe side effects (and how short-circuit
/// behavior is made visible at all).
#[derive(Clone, Default)]
pub struct Output {
    sink: Option<Rc<RefCell<String>>>,
}

impl Output {
    /// Prints to stdout.
    pub fn stdout() -> Output {
        Output { sink: None }
    }

    /// Buffers everything printed; read it back with
    /// [`Output::contents`].
    pub fn capture() -> Output {
        Output {
            sink: Some(Rc::default()),
        }
    }

    pub fn contents(&self) -> String {
        match &self.sink {
            Some(buffer) => buffer.borrow().clone(),
            None => String::new(),
        }
    }

    fn line(&self, text: &str) {
        match &self.sink {
            Some(buffer) => {
                let mut buffer = buffer.borrow_mut();
                buffer.push_str(text);
                buffer.push('\n');
            }
            None => println!("{text}"),
        }
    }
}

/// Builds the evaluation environment: the native functions plus the
/// `variable`/`function`/`object` testing fixtures.
pub fn scope(output: &Output) -> Scope<RuntimeValue> {
    let scope = Scope::root();

    let out = output.clone();
    define_native(&scope, "debug", move |arguments| {
        let argument = single("debug", arguments)?;
        out.line(&format!("{argument:?}"));
        Ok(RuntimeValue::nil())
    });

    let out = output.clone();
    define_native(&scope, "print", move |arguments| {
        let argument = single("print", arguments)?;
        out.line(&argument.print());
        Ok(RuntimeValue::nil())
    });

    let out = output.clone();
    define_native(&scope, "log", move |arguments| {
        let argument = single("log", arguments)?;
        out.line(&format!("log: {}", argument.print()));
        Ok(argument)
    });

    define_native(&scope, "list", |arguments| {
        Ok(RuntimeValue::Primitive(Primitive::List(arguments)))
    });

    define_native(&scope, "range", range);

    scope
        .define(
            "variable",
            RuntimeValue::Primitive(Primitive::String("variable".into())),
        )
        .expect("fresh environment scope");
    define_native(&scope, "function", |arguments| {
        Ok(RuntimeValue::Primitive(Primitive::List(arguments)))
    });

    let members = Scope::root();
    members
        .define(
            "property",
            RuntimeValue::Primitive(Primitive::String("property".into())),
        )
        .expect("fresh scope");
    let method = Function::native("method", |arguments| {
        Ok(RuntimeValue::Primitive(Primitive::List(arguments)))
    });
    members
        .define("method", RuntimeValue::Function(method))
        .expect("fresh scope");
    scope
        .define(
            "object",
            RuntimeValue::Object(ObjectValue {
                name: Some("Object".into()),
                scope: members,
            }),
        )
        .expect("fresh environment scope");

    scope
}

/// `range(a, b)`: the half-open integer range `[a, b)` as a list.
fn range(arguments: Vec<RuntimeValue>) -> Result<RuntimeValue> {
    let [start, end] = arguments.as_slice() else {
        return Err(Error::ArityMismatch {
            name: "range".into(),
            expected: 2,
            actual: arguments.len(),
        });
    };
    let (
        RuntimeValue::Primitive(Primitive::Integer(start)),
        RuntimeValue::Primitive(Primitive::Integer(end)),
    ) = (start, end)
    else {
        return Err(Error::RangeArgumentsNotIntegers);
    };
    if start > end {
        return Err(Error::RangeStartExceedsEnd {
            start: start.clone(),
            end: end.clone(),
        });
    }

    let mut elements = Vec::new();
    let mut current = start.clone();
    while current < *end {
        elements.push(RuntimeValue::Primitive(Primitive::Integer(current.clone())));
        current += num_bigint::BigInt::one();
    }
    Ok(RuntimeValue::Primitive(Primitive::List(elements)))
}

fn define_native(
    scope: &Scope<RuntimeValue>,
    name: &str,
    definition: impl Fn(Vec<RuntimeValue>) -> Result<RuntimeValue> + 'static,
) {
    scope
        .define(name, RuntimeValue::Function(Function::native(name, definition)))
        .expect("fresh environment scope");
}

/// Unwraps the single argument of a unary native.
fn single(name: &str, mut arguments: Vec<RuntimeValue>) -> Result<RuntimeValue> {
    if arguments.len() != 1 {
        return Err(Error::ArityMismatch {
            name: name.into(),
            expected: 1,
            actual: arguments.len(),
        });
    }
    Ok(arguments.remove(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::Definition;
    use num_bigint::BigInt;
    use pretty_assertions::assert_eq;

    fn int(value: i64) -> RuntimeValue {
        RuntimeValue::Primitive(Primitive::Integer(BigInt::from(value)))
    }

    fn call(
        scope: &Scope<RuntimeValue>,
        name: &str,
        arguments: Vec<RuntimeValue>,
    ) -> Result<RuntimeValue> {
        let Some(RuntimeValue::Function(function)) = scope.get(name, true) else {
            panic!("native '{name}' is not defined");
        };
        let Definition::Native(native) = &function.definition else {
            panic!("native '{name}' is not native");
        };
        native(arguments)
    }

    #[test]
    fn print_writes_the_printable_form() {
        let output = Output::capture();
        let scope = scope(&output);
        call(&scope, "print", vec![int(3)]).unwrap();
        call(&scope, "print", vec![RuntimeValue::nil()]).unwrap();
        assert_eq!(output.contents(), "3\nNIL\n");
    }

    #[test]
    fn log_prints_and_returns_its_argument() {
        let output = Output::capture();
        let scope = scope(&output);
        let result = call(&scope, "log", vec![int(7)]).unwrap();
        assert_eq!(result, int(7));
        assert_eq!(output.contents(), "log: 7\n");
    }

    #[test]
    fn print_checks_its_arity() {
        let output = Output::capture();
        let scope = scope(&output);
        assert_eq!(
            call(&scope, "print", vec![]).unwrap_err(),
            Error::ArityMismatch {
                name: "print".into(),
                expected: 1,
                actual: 0,
            },
        );
    }

    #[test]
    fn list_wraps_its_arguments() {
        let output = Output::capture();
        let scope = scope(&output);
        let result = call(&scope, "list", vec![int(1), int(2)]).unwrap();
        assert_eq!(
            result,
            RuntimeValue::Primitive(Primitive::List(vec![int(1), int(2)])),
        );
    }

    #[test]
    fn range_produces_a_half_open_list() {
        let output = Output::capture();
        let scope = scope(&output);
        assert_eq!(
            call(&scope, "range", vec![int(0), int(3)]).unwrap(),
            RuntimeValue::Primitive(Primitive::List(vec![int(0), int(1), int(2)])),
        );
        assert_eq!(
            call(&scope, "range", vec![int(2), int(2)]).unwrap(),
            RuntimeValue::Primitive(Primitive::List(vec![])),
        );
    }

    #[test]
    fn range_rejects_bad_arguments() {
        let output = Output::capture();
        let scope = scope(&output);
        assert_eq!(
            call(&scope, "range", vec![int(3), int(1)]).unwrap_err(),
            Error::RangeStartExceedsEnd {
                start: BigInt::from(3),
                end: BigInt::from(1),
            },
        );
        assert_eq!(
            call(&scope, "range", vec![int(1)]).unwrap_err(),
            Error::ArityMismatch {
                name: "range".into(),
                expected: 2,
                actual: 1,
            },
        );
        assert_eq!(
            call(
                &scope,
                "range",
                vec![
                    RuntimeValue::Primitive(Primitive::String("a".into())),
                    int(2),
                ],
            )
            .unwrap_err(),
            Error::RangeArgumentsNotIntegers,
        );
    }

    #[test]
    fn fixtures_are_defined() {
        let output = Output::capture();
        let scope = scope(&output);
        assert_eq!(
            scope.get("variable", true),
            Some(RuntimeValue::Primitive(Primitive::String("variable".into()))),
        );
        let Some(RuntimeValue::Object(object)) = scope.get("object", true) else {
            panic!("object fixture missing");
        };
        assert_eq!(
            object.scope.get("property", true),
            Some(RuntimeValue::Primitive(Primitive::String("property".into()))),
        );
        assert!(matches!(
            object.scope.get("method", true),
            Some(RuntimeValue::Function(_)),
        ));
    }
}
