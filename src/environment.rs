use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::{error::Error, object::Object, token::Token};

pub struct Environment {
    values: HashMap<String, Object>,
    enclosing: Option<Rc<RefCell<Environment>>>, // Parent-pointer
}

impl Environment {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
            enclosing: None,
        }
    }

    pub fn from(enclosing: &Rc<RefCell<Environment>>) -> Self {
        Self {
            values: HashMap::new(),
            enclosing: Some(Rc::clone(enclosing)),
        }
    }

    pub fn define(&mut self, name: String, value: Object) {
        self.values.insert(name, value);
    }

    pub fn get(&self, name: &Token) -> Result<Object, Error> {
        let key = &*name.lexeme;
        if let Some(value) = self.values.get(key) {
            Ok((*value).clone())
        } else if let Some(ref enclosing) = self.enclosing {
            // it is probably faster to iteratively walk the chain but recursion here is prettier
            enclosing.borrow().get(name)
        } else {
            Err(Error::Runtime {
                token: name.clone(),
                message: format!("Undefined variable '{}'.", key),
            })
        }
    }

    pub fn assign(&mut self, name: &Token, value: Object) -> Result<(), Error> {
        let key = &*name.lexeme;
        if self.values.contains_key(key) {
            self.values.insert(name.lexeme.clone(), value);
            Ok(())
        } else if let Some(ref enclosing) = self.enclosing {
            enclosing.borrow_mut().assign(name, value)
        } else {
            Err(Error::Runtime {
                token: name.clone(),
                message: format!("Undefined variable '{}'.", key),
            })
        }
    }

    // Walks `enclosing` exactly `distance` times. The resolver guarantees the
    // chain is at least that deep for every node it resolved, so a shorter
    // chain here is a resolver/evaluator discipline bug, not a user error.
    pub fn ancestor(env: &Rc<RefCell<Environment>>, distance: usize) -> Rc<RefCell<Environment>> {
        let mut environment = Rc::clone(env);
        for _ in 0..distance {
            let next = environment
                .borrow()
                .enclosing
                .clone()
                .expect("resolved distance exceeds the environment chain");
            environment = next;
        }
        environment
    }

    // Direct access at a resolved distance: unlike `get`/`assign`, these
    // don't fall through to `enclosing` on a miss - the resolver already
    // proved the name lives in that exact scope.
    pub fn get_at(env: &Rc<RefCell<Environment>>, distance: usize, name: &str) -> Object {
        Environment::ancestor(env, distance)
            .borrow()
            .values
            .get(name)
            .cloned()
            .expect("resolver guarantees the binding exists at the recorded distance")
    }

    pub fn assign_at(
        env: &Rc<RefCell<Environment>>,
        distance: usize,
        name: &Token,
        value: Object,
    ) {
        Environment::ancestor(env, distance)
            .borrow_mut()
            .values
            .insert(name.lexeme.clone(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenType;

    fn token(name: &str) -> Token {
        Token::new(TokenType::Identifier, name, 1)
    }

    #[test]
    fn get_falls_through_to_enclosing_scope() {
        let globals = Rc::new(RefCell::new(Environment::new()));
        globals
            .borrow_mut()
            .define("a".to_string(), Object::Number(1.0));
        let inner = Rc::new(RefCell::new(Environment::from(&globals)));

        let value = inner.borrow().get(&token("a")).unwrap();
        assert!(value.equals(&Object::Number(1.0)));
    }

    #[test]
    fn assign_to_undefined_name_is_a_runtime_error() {
        let globals = Rc::new(RefCell::new(Environment::new()));
        let err = globals
            .borrow_mut()
            .assign(&token("missing"), Object::Null)
            .unwrap_err();
        assert!(matches!(err, Error::Runtime { .. }));
    }

    #[test]
    fn get_at_reads_the_exact_ancestor_scope() {
        let globals = Rc::new(RefCell::new(Environment::new()));
        let middle = Rc::new(RefCell::new(Environment::from(&globals)));
        middle
            .borrow_mut()
            .define("x".to_string(), Object::Number(2.0));
        let inner = Rc::new(RefCell::new(Environment::from(&middle)));

        let value = Environment::get_at(&inner, 1, "x");
        assert!(value.equals(&Object::Number(2.0)));
    }

    #[test]
    fn assign_at_writes_the_exact_ancestor_scope_without_falling_through() {
        let globals = Rc::new(RefCell::new(Environment::new()));
        globals
            .borrow_mut()
            .define("x".to_string(), Object::Number(1.0));
        let inner = Rc::new(RefCell::new(Environment::from(&globals)));
        inner
            .borrow_mut()
            .define("x".to_string(), Object::Number(9.0));

        Environment::assign_at(&inner, 0, &token("x"), Object::Number(3.0));

        assert!(Environment::get_at(&inner, 0, "x").equals(&Object::Number(3.0)));
        assert!(globals
            .borrow()
            .get(&token("x"))
            .unwrap()
            .equals(&Object::Number(1.0)));
    }
}
