use crate::environment::Environment;
use crate::error::Error;
use crate::interpreter::Interpreter;
use crate::syntax::Stmt;
use crate::token::Token;
use crate::value::Value;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

#[derive(Clone)]
pub enum Function {
    /// Exposed to user code but implemented in the host language — sometimes
    /// called primitives or foreign functions.
    Native {
        arity: usize,
        body: Box<fn(&[Value]) -> Value>,
    },

    User {
        name: Token,
        params: Vec<Token>,
        body: Vec<Stmt>,
        closure: Rc<RefCell<Environment>>,
        /// `init` methods implicitly return `this`, even from a bare `return;`.
        is_initializer: bool,
    },
}

impl Function {
    pub fn call(&self, interpreter: &mut Interpreter, arguments: &[Value]) -> Result<Value, Error> {
        match self {
            Function::Native { body, .. } => Ok(body(arguments)),
            Function::User {
                params,
                body,
                closure,
                is_initializer,
                ..
            } => {
                // Each call gets its own environment, nested inside the
                // closure captured at declaration time; otherwise recursion
                // and concurrent calls to the same function would collide.
                let environment = Rc::new(RefCell::new(Environment::from(closure)));
                for (param, argument) in params.iter().zip(arguments.iter()) {
                    environment
                        .borrow_mut()
                        .define(param.lexeme.clone(), argument.clone());
                }

                let result = match interpreter.execute_block(body, environment) {
                    Err(Error::Return { value }) => Ok(value),
                    Err(other) => Err(other),
                    Ok(..) => Ok(Value::Nil),
                };

                if *is_initializer {
                    // `return;` inside init still yields `this`, not nil.
                    closure.borrow().get(&Token::synthetic("this"))
                } else {
                    result
                }
            }
        }
    }

    /// Creates a new environment nested inside the method's closure — a
    /// closure-within-a-closure — and binds `this` in it. When the method is
    /// later called, that environment becomes the parent of the call frame.
    pub fn bind(&self, instance: Value) -> Self {
        match self {
            Function::Native { .. } => unreachable!("native functions are never bound"),
            Function::User {
                name,
                params,
                body,
                closure,
                is_initializer,
            } => {
                let environment = Rc::new(RefCell::new(Environment::from(closure)));
                environment
                    .borrow_mut()
                    .define("this".to_string(), instance);
                Function::User {
                    name: name.clone(),
                    params: params.clone(),
                    body: body.clone(),
                    closure: environment,
                    is_initializer: *is_initializer,
                }
            }
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Function::Native { arity, .. } => *arity,
            Function::User { params, .. } => params.len(),
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Native { .. } => write!(f, "<native fn>"),
            Function::User { name, .. } => write!(f, "<fn {}>", name.lexeme),
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenKind;

    #[test]
    fn native_arity_and_display() {
        let clock = Function::Native {
            arity: 0,
            body: Box::new(|_| Value::Number(0.0)),
        };
        assert_eq!(clock.arity(), 0);
        assert_eq!(clock.to_string(), "<native fn>");
    }

    #[test]
    fn user_function_display_uses_its_name() {
        let f = Function::User {
            name: Token::new(TokenKind::Identifier, "greet", 1),
            params: Vec::new(),
            body: Vec::new(),
            closure: Rc::new(RefCell::new(Environment::new())),
            is_initializer: false,
        };
        assert_eq!(f.to_string(), "<fn greet>");
    }

    #[test]
    fn bind_preserves_is_initializer() {
        let f = Function::User {
            name: Token::new(TokenKind::Identifier, "init", 1),
            params: Vec::new(),
            body: Vec::new(),
            closure: Rc::new(RefCell::new(Environment::new())),
            is_initializer: true,
        };
        let instance = Value::Nil;
        let bound = f.bind(instance);
        match bound {
            Function::User { is_initializer, .. } => assert!(is_initializer),
            _ => panic!("expected a user function"),
        }
    }
}
