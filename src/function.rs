use crate::environment::Environment;
use crate::error::Error;
use crate::interpreter::Interpreter;
use crate::object::Object;
use crate::syntax::FunctionDecl;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

#[derive(Clone)]
pub enum Function {
    // These are functions that the interpreter exposes to user code but that
    // are implemented in the host language. Sometimes these are called
    // primitives, external functions, or foreign functions. To add a native
    // function, the book uses anonymous class instances that implement the
    // LoxCallable interface; a bare fn pointer is enough here since none of
    // them close over interpreter state.
    Native {
        name: &'static str,
        arity: usize,
        body: fn(&[Object]) -> Object,
    },

    // LoxFunction in the book. `declaration` is shared, not cloned, so
    // binding the same method to many instances doesn't copy its body.
    User {
        declaration: Rc<FunctionDecl>,
        closure: Rc<RefCell<Environment>>,
        is_initializer: bool,
    },
}

impl Function {
    // We pass in the interpreter in case the class implementing
    // call() needs it. We also give it the list of evaluated
    // argument values. The implementer’s job is then to return the
    // value that the call expression produces.
    pub fn call(&self, interpreter: &mut Interpreter, arguments: &[Object]) -> Result<Object, Error> {
        match self {
            Function::Native { body, .. } => Ok(body(arguments)),
            Function::User {
                declaration,
                closure,
                is_initializer,
            } => {
                // This means each function gets its own environment where it stores those variables.

                // Further, this environment must be created dynamically. Each
                // function call gets its own environment. Otherwise, recursion
                // would break. If there are multiple calls to the same function
                // in play at the same time, each needs its own environment,
                // even though they are all calls to the same function.
                let environment = Rc::new(RefCell::new(Environment::from(closure)));
                for (param, argument) in declaration.params.iter().zip(arguments.iter()) {
                    environment
                        .borrow_mut()
                        .define(param.lexeme.clone(), argument.clone());
                }

                let result = match interpreter.execute_block(&declaration.body, environment) {
                    Err(Error::Return { value }) => Ok(value),
                    Err(other) => return Err(other),
                    Ok(..) => Ok(Object::Null), // We don't have a return statement
                };

                if *is_initializer {
                    // `init` always returns the bound instance, explicit
                    // `return;` or falling off the end alike.
                    Ok(Environment::get_at(closure, 0, "this"))
                } else {
                    result
                }
            }
        }
    }

    // We create a new environment nestled inside the method’s original closure.
    // Sort of a closure-within-a-closure. When the method is called, that will
    // become the parent of the method body’s environment. We declare “this” as
    // a variable in that environment and bind it to the given instance, the
    // instance that the method is being accessed from.
    pub fn bind(&self, instance: Object) -> Self {
        match self {
            Function::Native { .. } => unreachable!("native functions are never bound"),
            Function::User {
                declaration,
                closure,
                is_initializer,
            } => {
                let environment = Rc::new(RefCell::new(Environment::from(closure)));
                environment
                    .borrow_mut()
                    .define("this".to_string(), instance);
                Function::User {
                    declaration: Rc::clone(declaration),
                    closure: environment,
                    is_initializer: *is_initializer,
                }
            }
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Function::Native { arity, .. } => *arity,
            Function::User { declaration, .. } => declaration.params.len(),
        }
    }
}

// Implements to_string which corresponds to toString from the book
impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Native { name, .. } => write!(f, "<native fn {name}>"),
            Function::User { declaration, .. } => write!(f, "<fn {}>", declaration.name.lexeme),
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenType;

    fn decl(name: &str, params: Vec<&str>) -> Rc<FunctionDecl> {
        Rc::new(FunctionDecl {
            name: Token::new(TokenType::Identifier, name, 1),
            params: params
                .into_iter()
                .map(|p| Token::new(TokenType::Identifier, p, 1))
                .collect(),
            body: Vec::new(),
        })
    }

    use crate::token::Token;

    #[test]
    fn bind_shares_the_declaration_without_cloning_the_body() {
        let closure = Rc::new(RefCell::new(Environment::new()));
        let f = Function::User {
            declaration: decl("greet", vec!["who"]),
            closure,
            is_initializer: false,
        };
        let bound = f.bind(Object::Number(1.0));
        if let (
            Function::User { declaration: a, .. },
            Function::User { declaration: b, .. },
        ) = (&f, &bound)
        {
            assert!(Rc::ptr_eq(a, b));
        } else {
            panic!("expected User functions");
        }
    }

    #[test]
    fn arity_matches_parameter_count() {
        let closure = Rc::new(RefCell::new(Environment::new()));
        let f = Function::User {
            declaration: decl("add", vec!["a", "b"]),
            closure,
            is_initializer: false,
        };
        assert_eq!(f.arity(), 2);
    }
}
