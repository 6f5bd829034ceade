use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::class::{LoxClass, LoxInstance};
use crate::environment::Environment;
use crate::error::Error;
use crate::function::Function;
use crate::syntax::{expr, stmt, Expr, LiteralValue, Stmt};
use crate::token::{Token, TokenKind};
use crate::value::Value;

pub struct Interpreter {
    pub globals: Rc<RefCell<Environment>>,
    environment: Rc<RefCell<Environment>>,
    /// Scope distances computed by the resolver, keyed by the `Expr`'s stable
    /// id rather than by pointer, since the tree is owned and may be cloned.
    locals: HashMap<u64, usize>,
}

impl Interpreter {
    pub fn new() -> Self {
        let globals = Rc::new(RefCell::new(Environment::new()));

        globals.borrow_mut().define(
            "clock".to_string(),
            Value::Callable(Rc::new(Function::Native {
                arity: 0,
                body: Box::new(|_| {
                    let now = SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .expect("system clock is before the epoch");
                    Value::Number(now.as_secs_f64())
                }),
            })),
        );

        Interpreter {
            environment: Rc::clone(&globals),
            globals,
            locals: HashMap::new(),
        }
    }

    pub fn resolve(&mut self, expr_id: u64, distance: usize) {
        self.locals.insert(expr_id, distance);
    }

    pub fn interpret(&mut self, statements: &[Stmt]) -> Result<(), Error> {
        for statement in statements {
            if let Err(err) = self.execute(statement) {
                crate::error::runtime_error(&err);
                return Err(err);
            }
        }
        Ok(())
    }

    fn execute(&mut self, statement: &Stmt) -> Result<(), Error> {
        statement.accept(self)
    }

    pub fn execute_block(
        &mut self,
        statements: &[Stmt],
        environment: Rc<RefCell<Environment>>,
    ) -> Result<(), Error> {
        let previous = std::mem::replace(&mut self.environment, environment);

        // Restore the previous environment even if a statement returns early
        // via Err(Error::Return) or propagates a runtime error.
        let result = (|| {
            for statement in statements {
                self.execute(statement)?;
            }
            Ok(())
        })();

        self.environment = previous;
        result
    }

    fn evaluate(&mut self, expr: &Expr) -> Result<Value, Error> {
        expr.accept(self)
    }

    fn look_up_variable(&mut self, name: &Token, expr: &Expr) -> Result<Value, Error> {
        if let Some(&distance) = self.locals.get(&expr.id()) {
            Environment::get_at(&self.environment, distance, name)
        } else {
            self.globals.borrow().get(name)
        }
    }

    fn stringify(value: &Value) -> String {
        value.to_string()
    }

    fn number_operand_error<R>(operator: &Token) -> Result<R, Error> {
        Err(Error::Runtime {
            token: operator.clone(),
            message: "Operand must be a number.".to_string(),
        })
    }

    fn number_operands_error<R>(operator: &Token) -> Result<R, Error> {
        Err(Error::Runtime {
            token: operator.clone(),
            message: "Operands must be numbers.".to_string(),
        })
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl expr::Visitor<Value> for Interpreter {
    fn visit_literal_expr(&mut self, _expr: &Expr, value: &LiteralValue) -> Result<Value, Error> {
        Ok(match value {
            LiteralValue::Boolean(b) => Value::Bool(*b),
            LiteralValue::Null => Value::Nil,
            LiteralValue::Number(n) => Value::Number(*n),
            LiteralValue::String(s) => Value::String(s.clone()),
        })
    }

    fn visit_grouping_expr(&mut self, _expr: &Expr, expression: &Expr) -> Result<Value, Error> {
        self.evaluate(expression)
    }

    fn visit_unary_expr(&mut self, _expr: &Expr, operator: &Token, right: &Expr) -> Result<Value, Error> {
        let right = self.evaluate(right)?;

        match operator.kind {
            TokenKind::Minus => match right {
                Value::Number(n) => Ok(Value::Number(-n)),
                _ => Self::number_operand_error(operator),
            },
            TokenKind::Bang => Ok(Value::Bool(!right.is_truthy())),
            _ => unreachable!("parser never produces a non-unary operator here"),
        }
    }

    fn visit_binary_expr(
        &mut self,
        _expr: &Expr,
        left: &Expr,
        operator: &Token,
        right: &Expr,
    ) -> Result<Value, Error> {
        let l = self.evaluate(left)?;
        let r = self.evaluate(right)?;

        match operator.kind {
            TokenKind::Minus => match (l, r) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a - b)),
                _ => Self::number_operands_error(operator),
            },
            TokenKind::Slash => match (l, r) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a / b)),
                _ => Self::number_operands_error(operator),
            },
            TokenKind::Star => match (l, r) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a * b)),
                _ => Self::number_operands_error(operator),
            },
            TokenKind::Plus => match (l, r) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
                (Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),
                _ => Err(Error::Runtime {
                    token: operator.clone(),
                    message: "Operands must be two numbers or two strings.".to_string(),
                }),
            },
            TokenKind::GreaterEqual => match (l, r) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Bool(a >= b)),
                _ => Self::number_operands_error(operator),
            },
            TokenKind::Greater => match (l, r) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Bool(a > b)),
                _ => Self::number_operands_error(operator),
            },
            TokenKind::LessEqual => match (l, r) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Bool(a <= b)),
                _ => Self::number_operands_error(operator),
            },
            TokenKind::Less => match (l, r) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Bool(a < b)),
                _ => Self::number_operands_error(operator),
            },
            TokenKind::BangEqual => Ok(Value::Bool(!l.equals(&r))),
            TokenKind::EqualEqual => Ok(Value::Bool(l.equals(&r))),
            _ => unreachable!("parser never produces a non-binary operator here"),
        }
    }

    fn visit_logical_expr(
        &mut self,
        _expr: &Expr,
        left: &Expr,
        operator: &Token,
        right: &Expr,
    ) -> Result<Value, Error> {
        let left = self.evaluate(left)?;

        // Short-circuit: return the truthy/falsy operand itself, not a bool.
        if operator.kind == TokenKind::Or {
            if left.is_truthy() {
                return Ok(left);
            }
        } else if !left.is_truthy() {
            return Ok(left);
        }

        self.evaluate(right)
    }

    fn visit_variable_expr(&mut self, expr: &Expr, name: &Token) -> Result<Value, Error> {
        self.look_up_variable(name, expr)
    }

    fn visit_assign_expr(&mut self, expr: &Expr, name: &Token, value: &Expr) -> Result<Value, Error> {
        let value = self.evaluate(value)?;

        if let Some(&distance) = self.locals.get(&expr.id()) {
            Environment::assign_at(&self.environment, distance, name, value.clone())?;
        } else {
            self.globals.borrow_mut().assign(name, value.clone())?;
        }

        Ok(value)
    }

    fn visit_call_expr(
        &mut self,
        _expr: &Expr,
        callee: &Expr,
        paren: &Token,
        arguments: &[Expr],
    ) -> Result<Value, Error> {
        let callee = self.evaluate(callee)?;

        let mut args = Vec::with_capacity(arguments.len());
        for argument in arguments {
            args.push(self.evaluate(argument)?);
        }

        let (callable, arity) = match &callee {
            Value::Callable(function) => (function.clone(), function.arity()),
            Value::Class(class) => {
                let instance = LoxInstance::new(class);
                let initializer = class.borrow().find_method("init");
                return match initializer {
                    Some(init) => {
                        let bound = init.bind(instance.clone());
                        if args.len() != bound.arity() {
                            return Err(Error::Runtime {
                                token: paren.clone(),
                                message: format!(
                                    "Expected {} arguments but got {}.",
                                    bound.arity(),
                                    args.len()
                                ),
                            });
                        }
                        bound.call(self, &args)?;
                        Ok(instance)
                    }
                    None => {
                        if !args.is_empty() {
                            return Err(Error::Runtime {
                                token: paren.clone(),
                                message: format!("Expected 0 arguments but got {}.", args.len()),
                            });
                        }
                        Ok(instance)
                    }
                };
            }
            _ => {
                return Err(Error::Runtime {
                    token: paren.clone(),
                    message: "Can only call functions and classes.".to_string(),
                })
            }
        };

        if args.len() != arity {
            return Err(Error::Runtime {
                token: paren.clone(),
                message: format!("Expected {} arguments but got {}.", arity, args.len()),
            });
        }

        callable.call(self, &args)
    }

    fn visit_get_expr(&mut self, _expr: &Expr, object: &Expr, name: &Token) -> Result<Value, Error> {
        let object = self.evaluate(object)?;
        if let Value::Instance(instance) = &object {
            instance.borrow().get(name, &object)
        } else {
            Err(Error::Runtime {
                token: name.clone(),
                message: "Only instances have properties.".to_string(),
            })
        }
    }

    fn visit_set_expr(
        &mut self,
        _expr: &Expr,
        object: &Expr,
        name: &Token,
        value: &Expr,
    ) -> Result<Value, Error> {
        let object = self.evaluate(object)?;

        let instance = match &object {
            Value::Instance(instance) => instance,
            _ => {
                return Err(Error::Runtime {
                    token: name.clone(),
                    message: "Only instances have fields.".to_string(),
                })
            }
        };

        let value = self.evaluate(value)?;
        instance.borrow_mut().set(name, value.clone());
        Ok(value)
    }

    fn visit_this_expr(&mut self, expr: &Expr, keyword: &Token) -> Result<Value, Error> {
        self.look_up_variable(keyword, expr)
    }

    fn visit_super_expr(&mut self, expr: &Expr, keyword: &Token, method: &Token) -> Result<Value, Error> {
        let distance = *self
            .locals
            .get(&expr.id())
            .expect("resolver always records a distance for 'super'");

        let superclass = Environment::get_at(&self.environment, distance, keyword)?;
        let superclass = match superclass {
            Value::Class(class) => class,
            _ => unreachable!("'super' always resolves to a class"),
        };

        // `this` lives exactly one scope closer than `super`, since the
        // resolver pushes the `this` scope right after the `super` one.
        let instance = Environment::get_at(&self.environment, distance - 1, &Token::synthetic("this"))?;

        let found = superclass.borrow().find_method(&method.lexeme);
        match found {
            Some(found_method) => Ok(Value::Callable(Rc::new(found_method.bind(instance)))),
            None => Err(Error::Runtime {
                token: method.clone(),
                message: format!("Undefined property '{}'.", method.lexeme),
            }),
        }
    }
}

impl stmt::Visitor<()> for Interpreter {
    fn visit_expression_stmt(&mut self, expression: &Expr) -> Result<(), Error> {
        self.evaluate(expression)?;
        Ok(())
    }

    fn visit_print_stmt(&mut self, expression: &Expr) -> Result<(), Error> {
        let value = self.evaluate(expression)?;
        println!("{}", Self::stringify(&value));
        Ok(())
    }

    fn visit_var_stmt(&mut self, name: &Token, initializer: &Option<Expr>) -> Result<(), Error> {
        let value = match initializer {
            Some(init) => self.evaluate(init)?,
            None => Value::Nil,
        };
        self.environment.borrow_mut().define(name.lexeme.clone(), value);
        Ok(())
    }

    fn visit_block_stmt(&mut self, statements: &[Stmt]) -> Result<(), Error> {
        let environment = Rc::new(RefCell::new(Environment::from(&self.environment)));
        self.execute_block(statements, environment)
    }

    fn visit_if_stmt(
        &mut self,
        condition: &Expr,
        then_branch: &Stmt,
        else_branch: &Option<Box<Stmt>>,
    ) -> Result<(), Error> {
        if self.evaluate(condition)?.is_truthy() {
            self.execute(then_branch)?;
        } else if let Some(else_stmt) = else_branch {
            self.execute(else_stmt)?;
        }
        Ok(())
    }

    fn visit_while_stmt(&mut self, condition: &Expr, body: &Stmt) -> Result<(), Error> {
        while self.evaluate(condition)?.is_truthy() {
            self.execute(body)?;
        }
        Ok(())
    }

    fn visit_function_stmt(&mut self, name: &Token, params: &[Token], body: &[Stmt]) -> Result<(), Error> {
        let function = Function::User {
            name: name.clone(),
            params: params.to_vec(),
            body: body.to_vec(),
            closure: Rc::clone(&self.environment),
            is_initializer: false,
        };
        self.environment
            .borrow_mut()
            .define(name.lexeme.clone(), Value::Callable(Rc::new(function)));
        Ok(())
    }

    fn visit_return_stmt(&mut self, _keyword: &Token, value: &Option<Expr>) -> Result<(), Error> {
        let value = match value {
            Some(expr) => self.evaluate(expr)?,
            None => Value::Nil,
        };
        Err(Error::Return { value })
    }

    fn visit_class_stmt(
        &mut self,
        name: &Token,
        superclass: &Option<Expr>,
        methods: &[Stmt],
    ) -> Result<(), Error> {
        let superclass_value = match superclass {
            Some(superclass_expr) => {
                let value = self.evaluate(superclass_expr)?;
                match value {
                    Value::Class(class) => Some(class),
                    _ => {
                        let token = match superclass_expr {
                            Expr::Variable { name: var_name, .. } => var_name.clone(),
                            _ => name.clone(),
                        };
                        return Err(Error::Runtime {
                            token,
                            message: "Superclass must be a class.".to_string(),
                        });
                    }
                }
            }
            None => None,
        };

        self.environment
            .borrow_mut()
            .define(name.lexeme.clone(), Value::Nil);

        let previous_environment = if let Some(superclass) = &superclass_value {
            let enclosing = Rc::clone(&self.environment);
            self.environment = Rc::new(RefCell::new(Environment::from(&enclosing)));
            self.environment
                .borrow_mut()
                .define("super".to_string(), Value::Class(Rc::clone(superclass)));
            Some(enclosing)
        } else {
            None
        };

        let mut class_methods = HashMap::new();
        for method in methods {
            if let Stmt::Function {
                name: method_name,
                params,
                body,
            } = method
            {
                let function = Function::User {
                    name: method_name.clone(),
                    params: params.clone(),
                    body: body.clone(),
                    closure: Rc::clone(&self.environment),
                    is_initializer: method_name.lexeme == "init",
                };
                class_methods.insert(method_name.lexeme.clone(), function);
            }
        }

        if let Some(enclosing) = previous_environment {
            self.environment = enclosing;
        }

        let class = Value::Class(Rc::new(RefCell::new(LoxClass {
            name: name.lexeme.clone(),
            superclass: superclass_value,
            methods: class_methods,
        })));

        self.environment.borrow_mut().assign(name, class)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::resolver::Resolver;
    use crate::scanner::Scanner;

    fn run(source: &str) -> Result<(), Error> {
        crate::error::HAD_ERROR.store(false, std::sync::atomic::Ordering::Relaxed);
        let tokens = Scanner::new(source.to_string()).scan_tokens().clone();
        let stmts = Parser::new(&tokens).parse().unwrap();
        let mut interpreter = Interpreter::new();
        Resolver::new(&mut interpreter).resolve_stmts(&stmts);
        interpreter.interpret(&stmts)
    }

    #[test]
    fn arithmetic_and_string_concat() {
        assert!(run("print 1 + 2;").is_ok());
        assert!(run("print \"a\" + \"b\";").is_ok());
    }

    #[test]
    fn mixed_plus_operands_is_a_runtime_error() {
        let result = run("\"a\" + 1;");
        assert!(matches!(result, Err(Error::Runtime { .. })));
    }

    #[test]
    fn closures_capture_their_defining_environment() {
        let source = r#"
            fun makeCounter() {
                var i = 0;
                fun count() {
                    i = i + 1;
                    return i;
                }
                return count;
            }
            var counter = makeCounter();
            print counter();
            print counter();
        "#;
        assert!(run(source).is_ok());
    }

    #[test]
    fn inheritance_and_super_dispatch() {
        let source = r#"
            class Animal {
                speak() {
                    return "...";
                }
            }
            class Dog < Animal {
                speak() {
                    return super.speak();
                }
            }
            print Dog().speak();
        "#;
        assert!(run(source).is_ok());
    }

    #[test]
    fn initializer_implicitly_returns_this() {
        let source = r#"
            class Box {
                init(value) {
                    this.value = value;
                }
            }
            var b = Box(7);
            print b.value;
        "#;
        assert!(run(source).is_ok());
    }
}
