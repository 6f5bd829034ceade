use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::Error;
use crate::token::Token;
use crate::value::Value;

pub struct Environment {
    values: HashMap<String, Value>,
    enclosing: Option<Rc<RefCell<Environment>>>, // parent pointer
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

    pub fn define(&mut self, name: String, value: Value) {
        self.values.insert(name, value);
    }

    pub fn get(&self, name: &Token) -> Result<Value, Error> {
        let key = &*name.lexeme;
        if let Some(value) = self.values.get(key) {
            Ok(value.clone())
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

    pub fn assign(&mut self, name: &Token, value: Value) -> Result<(), Error> {
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

    /// Walks `distance` enclosing links up from `env`. The resolver guarantees
    /// that a recorded distance never overruns the chain active at evaluation.
    fn ancestor(env: &Rc<RefCell<Environment>>, distance: usize) -> Rc<RefCell<Environment>> {
        let mut frame = Rc::clone(env);
        for _ in 0..distance {
            let next = frame
                .borrow()
                .enclosing
                .clone()
                .expect("resolved distance exceeds the live frame chain");
            frame = next;
        }
        frame
    }

    /// Looks a name up in the frame exactly `distance` hops above `env`,
    /// without falling further up the chain — used for resolver-backed
    /// variable reads (§4.4's scope-distance soundness invariant).
    pub fn get_at(env: &Rc<RefCell<Environment>>, distance: usize, name: &Token) -> Result<Value, Error> {
        let frame = Self::ancestor(env, distance);
        let value = frame.borrow().values.get(&name.lexeme).cloned();
        value.ok_or_else(|| Error::Runtime {
            token: name.clone(),
            message: format!("Undefined variable '{}'.", name.lexeme),
        })
    }

    pub fn assign_at(
        env: &Rc<RefCell<Environment>>,
        distance: usize,
        name: &Token,
        value: Value,
    ) -> Result<(), Error> {
        let frame = Self::ancestor(env, distance);
        frame.borrow_mut().values.insert(name.lexeme.clone(), value);
        Ok(())
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenKind;

    fn token(name: &str) -> Token {
        Token::new(TokenKind::Identifier, name, 1)
    }

    #[test]
    fn lookup_falls_back_to_enclosing_frame() {
        let global = Rc::new(RefCell::new(Environment::new()));
        global
            .borrow_mut()
            .define("a".to_string(), Value::Number(1.0));
        let local = Rc::new(RefCell::new(Environment::from(&global)));

        assert!(local.borrow().get(&token("a")).unwrap().equals(&Value::Number(1.0)));
    }

    #[test]
    fn shadowing_in_inner_scope_does_not_touch_outer() {
        let global = Rc::new(RefCell::new(Environment::new()));
        global
            .borrow_mut()
            .define("a".to_string(), Value::String("global".to_string()));
        let local = Rc::new(RefCell::new(Environment::from(&global)));
        local
            .borrow_mut()
            .define("a".to_string(), Value::String("local".to_string()));

        assert!(local
            .borrow()
            .get(&token("a"))
            .unwrap()
            .equals(&Value::String("local".to_string())));
        assert!(global
            .borrow()
            .get(&token("a"))
            .unwrap()
            .equals(&Value::String("global".to_string())));
    }

    #[test]
    fn get_at_stops_at_the_requested_ancestor() {
        let global = Rc::new(RefCell::new(Environment::new()));
        global
            .borrow_mut()
            .define("a".to_string(), Value::Number(0.0));
        let local = Rc::new(RefCell::new(Environment::from(&global)));
        local.borrow_mut().define("a".to_string(), Value::Number(1.0));

        assert!(Environment::get_at(&local, 0, &token("a"))
            .unwrap()
            .equals(&Value::Number(1.0)));
        assert!(Environment::get_at(&local, 1, &token("a"))
            .unwrap()
            .equals(&Value::Number(0.0)));
    }

    #[test]
    fn undefined_variable_is_a_runtime_error() {
        let global = Rc::new(RefCell::new(Environment::new()));
        assert!(global.borrow().get(&token("missing")).is_err());
    }
}
