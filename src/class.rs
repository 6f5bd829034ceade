use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::Error;
use crate::function::Function;
use crate::token::Token;
use crate::value::Value;

/// The instance stores the state, the class stores the behavior — including,
/// through `superclass`, the behavior it inherits rather than defines itself.
#[derive(Debug)]
pub struct LoxClass {
    pub name: String,
    pub superclass: Option<Rc<RefCell<LoxClass>>>,
    pub methods: HashMap<String, Function>,
}

impl LoxClass {
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
    fields: HashMap<String, Value>,
}

impl LoxInstance {
    pub fn new(class: &Rc<RefCell<LoxClass>>) -> Value {
        let instance = LoxInstance {
            class: Rc::clone(class),
            fields: HashMap::new(),
        };

        Value::Instance(Rc::new(RefCell::new(instance)))
    }

    /// `instance` is this same instance wrapped as a `Value`, needed so a
    /// bound method closes over the right `this` rather than re-wrapping.
    pub fn get(&self, name: &Token, instance: &Value) -> Result<Value, Error> {
        if let Some(field) = self.fields.get(&name.lexeme) {
            Ok(field.clone())
        } else if let Some(method) = self.class.borrow().find_method(&name.lexeme) {
            Ok(Value::Callable(Rc::new(method.bind(instance.clone()))))
        } else {
            Err(Error::Runtime {
                token: name.clone(),
                message: format!("Undefined property '{}'.", name.lexeme),
            })
        }
    }

    /// Lox instances are loose bags of fields: no need to check the key
    /// already exists before overwriting it.
    pub fn set(&mut self, name: &Token, value: Value) {
        self.fields.insert(name.lexeme.clone(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenKind;

    fn class(name: &str, superclass: Option<Rc<RefCell<LoxClass>>>) -> Rc<RefCell<LoxClass>> {
        Rc::new(RefCell::new(LoxClass {
            name: name.to_string(),
            superclass,
            methods: HashMap::new(),
        }))
    }

    #[test]
    fn find_method_falls_through_to_superclass() {
        let base = class("Animal", None);
        base.borrow_mut().methods.insert(
            "speak".to_string(),
            Function::Native {
                arity: 0,
                body: Box::new(|_| Value::Nil),
            },
        );
        let derived = class("Dog", Some(Rc::clone(&base)));

        assert!(derived.borrow().find_method("speak").is_some());
        assert!(derived.borrow().find_method("fly").is_none());
    }

    #[test]
    fn instance_set_then_get_returns_field_before_method() {
        let base = class("Box", None);
        let value = LoxInstance::new(&base);
        if let Value::Instance(instance) = &value {
            instance
                .borrow_mut()
                .set(&Token::new(TokenKind::Identifier, "x", 1), Value::Number(7.0));
            let got = instance
                .borrow()
                .get(&Token::new(TokenKind::Identifier, "x", 1), &value)
                .unwrap();
            assert!(got.equals(&Value::Number(7.0)));
        } else {
            panic!("expected instance");
        }
    }
}
