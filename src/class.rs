use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::Error;
use crate::function::Function;
use crate::object::Object;
use crate::token::Token;

// The instance stores the state, the class stores the behaviour
#[derive(Debug)]
pub struct LoxClass {
    pub name: String,
    pub superclass: Option<Rc<RefCell<LoxClass>>>,
    pub methods: HashMap<String, Function>,
}

impl LoxClass {
    // Searches the class's own method table first, then recurses into the
    // superclass chain - a subclass's own `init` (or any other method)
    // always shadows the one it inherits. Returns an owned Function rather
    // than a reference: the superclass case has to borrow a different
    // LoxClass's RefCell, whose guard can't outlive this call.
    pub fn find_method(&self, name: &str) -> Option<Function> {
        if let Some(method) = self.methods.get(name) {
            Some(method.clone())
        } else {
            self.superclass
                .as_ref()
                .and_then(|superclass| superclass.borrow().find_method(name))
        }
    }
}

#[derive(Debug)]
pub struct LoxInstance {
    pub class: Rc<RefCell<LoxClass>>,
    fields: HashMap<String, Object>,
}

impl LoxInstance {
    // Returns a new `LoxInstance` wrapped in an `Object::Instance`
    pub fn new(class: &Rc<RefCell<LoxClass>>) -> Object {
        let instance = LoxInstance {
            class: Rc::clone(class),
            fields: HashMap::new(),
        };

        Object::Instance(Rc::new(RefCell::new(instance)))
    }

    // Returns a member field of this instance.
    // instance - A reference to this instance as an object.
    pub fn get(&self, name: &Token, instance: &Object) -> Result<Object, Error> {
        if let Some(field) = self.fields.get(&name.lexeme) {
            Ok(field.clone())
        } else if let Some(method) = self.class.borrow().find_method(&name.lexeme) {
            Ok(Object::Callable(method.bind(instance.clone())))
        } else {
            Err(Error::Runtime {
                token: name.clone(),
                message: format!("Undefined property '{}'.", name.lexeme),
            })
        }
    }

    // Since Lox allows freely creating new fields on instances, there’s no need
    // to see if the key is already present.
    pub fn set(&mut self, name: &Token, value: Object) {
        self.fields.insert(name.lexeme.clone(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenType;

    fn native_method(tag: &'static str) -> Function {
        Function::Native {
            name: tag,
            arity: 0,
            body: |_| Object::Null,
        }
    }

    #[test]
    fn find_method_falls_back_to_superclass() {
        let base = Rc::new(RefCell::new(LoxClass {
            name: "Base".to_string(),
            superclass: None,
            methods: HashMap::from([("greet".to_string(), native_method("base"))]),
        }));
        let derived = LoxClass {
            name: "Derived".to_string(),
            superclass: Some(Rc::clone(&base)),
            methods: HashMap::new(),
        };

        assert!(derived.find_method("greet").is_some());
        assert!(derived.find_method("missing").is_none());
    }

    #[test]
    fn instance_get_reports_undefined_property() {
        let class = Rc::new(RefCell::new(LoxClass {
            name: "Thing".to_string(),
            superclass: None,
            methods: HashMap::new(),
        }));
        let instance = LoxInstance::new(&class);
        let name = Token::new(TokenType::Identifier, "missing", 1);
        if let Object::Instance(inst) = &instance {
            let err = inst.borrow().get(&name, &instance).unwrap_err();
            assert!(matches!(err, Error::Runtime { .. }));
        } else {
            panic!("expected an instance");
        }
    }
}
