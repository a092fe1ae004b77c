use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::class::{LoxClass, LoxInstance};
use crate::environment::Environment;
use crate::error::{runtime_error, Error};
use crate::function::Function;
use crate::object::Object;
use crate::syntax::{expr, stmt, Expr, FunctionDecl, LiteralValue, NodeId, Stmt};
use crate::token::{Token, TokenType};

pub struct Interpreter {
    globals: Rc<RefCell<Environment>>,
    environment: Rc<RefCell<Environment>>,
    // Populated by the resolver, one entry per variable-use node it
    // managed to bind locally. A node absent here resolves against
    // `globals` instead.
    locals: HashMap<NodeId, usize>,
}

impl Interpreter {
    pub fn new() -> Self {
        let globals = Rc::new(RefCell::new(Environment::new()));
        globals.borrow_mut().define(
            "clock".to_string(),
            Object::Callable(Function::Native {
                name: "clock",
                arity: 0,
                body: |_| {
                    let now = SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .expect("system clock is before the Unix epoch")
                        .as_secs_f64();
                    Object::Number(now)
                },
            }),
        );

        Interpreter {
            environment: Rc::clone(&globals),
            globals,
            locals: HashMap::new(),
        }
    }

    // Called by the resolver as it walks the tree; never invoked by the
    // evaluator itself.
    pub fn resolve(&mut self, id: NodeId, depth: usize) {
        self.locals.insert(id, depth);
    }

    pub fn interpret(&mut self, statements: &[Stmt]) -> Result<(), Error> {
        for statement in statements {
            if let Err(err) = self.execute(statement) {
                runtime_error(&err);
                return Err(err);
            }
        }
        Ok(())
    }

    fn execute(&mut self, statement: &Stmt) -> Result<(), Error> {
        statement.accept(self)
    }

    // Swaps in `environment` for the duration of `statements`, always
    // restoring the caller's environment afterward - including when a
    // `return` unwinds through here.
    pub fn execute_block(
        &mut self,
        statements: &[Stmt],
        environment: Rc<RefCell<Environment>>,
    ) -> Result<(), Error> {
        let previous = Rc::clone(&self.environment);
        self.environment = environment;

        let result = statements.iter().try_for_each(|s| self.execute(s));

        self.environment = previous;
        result
    }

    fn evaluate(&mut self, expression: &Expr) -> Result<Object, Error> {
        expression.accept(self)
    }

    fn look_up_variable(&self, id: NodeId, name: &Token) -> Result<Object, Error> {
        if let Some(distance) = self.locals.get(&id) {
            Ok(Environment::get_at(&self.environment, *distance, &name.lexeme))
        } else {
            self.globals.borrow().get(name)
        }
    }

    fn number_operand_error<R>(&self, operator: &Token) -> Result<R, Error> {
        Err(Error::Runtime {
            token: operator.clone(),
            message: "Operand must be a number.".to_string(),
        })
    }
}

impl expr::Visitor<Object> for Interpreter {
    fn visit_literal_expr(&mut self, value: &LiteralValue) -> Result<Object, Error> {
        Ok(match value {
            LiteralValue::Boolean(b) => Object::Boolean(*b),
            LiteralValue::Null => Object::Null,
            LiteralValue::Number(n) => Object::Number(*n),
            LiteralValue::String(s) => Object::String(s.clone()),
        })
    }

    fn visit_grouping_expr(&mut self, expression: &Expr) -> Result<Object, Error> {
        self.evaluate(expression)
    }

    fn visit_unary_expr(&mut self, operator: &Token, right: &Expr) -> Result<Object, Error> {
        let right = self.evaluate(right)?;

        match operator.token_type {
            TokenType::Minus => match right {
                Object::Number(n) => Ok(Object::Number(-n)),
                _ => self.number_operand_error(operator),
            },
            TokenType::Bang => Ok(Object::Boolean(!right.is_truthy())),
            _ => unreachable!("parser never produces a unary op outside ! and -"),
        }
    }

    fn visit_binary_expr(
        &mut self,
        left: &Expr,
        operator: &Token,
        right: &Expr,
    ) -> Result<Object, Error> {
        let l = self.evaluate(left)?;
        let r = self.evaluate(right)?;

        match operator.token_type {
            TokenType::Minus => match (l, r) {
                (Object::Number(a), Object::Number(b)) => Ok(Object::Number(a - b)),
                _ => self.number_operand_error(operator),
            },
            TokenType::Slash => match (l, r) {
                (Object::Number(_), Object::Number(b)) if b == 0.0 => Err(Error::Runtime {
                    token: operator.clone(),
                    message: "Division by zero.".to_string(),
                }),
                (Object::Number(a), Object::Number(b)) => Ok(Object::Number(a / b)),
                _ => self.number_operand_error(operator),
            },
            TokenType::Star => match (l, r) {
                (Object::Number(a), Object::Number(b)) => Ok(Object::Number(a * b)),
                _ => self.number_operand_error(operator),
            },
            TokenType::Plus => match (l, r) {
                (Object::Number(a), Object::Number(b)) => Ok(Object::Number(a + b)),
                (Object::String(a), Object::String(b)) => Ok(Object::String(a + &b)),
                _ => Err(Error::Runtime {
                    token: operator.clone(),
                    message: "Operands must be two numbers or two strings.".to_string(),
                }),
            },
            TokenType::GreaterEqual => match (l, r) {
                (Object::Number(a), Object::Number(b)) => Ok(Object::Boolean(a >= b)),
                _ => self.number_operand_error(operator),
            },
            TokenType::Greater => match (l, r) {
                (Object::Number(a), Object::Number(b)) => Ok(Object::Boolean(a > b)),
                _ => self.number_operand_error(operator),
            },
            TokenType::LessEqual => match (l, r) {
                (Object::Number(a), Object::Number(b)) => Ok(Object::Boolean(a <= b)),
                _ => self.number_operand_error(operator),
            },
            TokenType::Less => match (l, r) {
                (Object::Number(a), Object::Number(b)) => Ok(Object::Boolean(a < b)),
                _ => self.number_operand_error(operator),
            },
            TokenType::BangEqual => Ok(Object::Boolean(!l.equals(&r))),
            TokenType::EqualEqual => Ok(Object::Boolean(l.equals(&r))),
            _ => unreachable!("parser never produces a binary op outside these"),
        }
    }

    fn visit_variable_expr(&mut self, id: NodeId, name: &Token) -> Result<Object, Error> {
        self.look_up_variable(id, name)
    }

    fn visit_assign_expr(
        &mut self,
        id: NodeId,
        name: &Token,
        value: &Expr,
    ) -> Result<Object, Error> {
        let value = self.evaluate(value)?;

        if let Some(distance) = self.locals.get(&id) {
            Environment::assign_at(&self.environment, *distance, name, value.clone());
        } else {
            self.globals.borrow_mut().assign(name, value.clone())?;
        }

        Ok(value)
    }

    fn visit_logical_expr(
        &mut self,
        left: &Expr,
        operator: &Token,
        right: &Expr,
    ) -> Result<Object, Error> {
        let left = self.evaluate(left)?;

        if operator.token_type == TokenType::Or {
            if left.is_truthy() {
                return Ok(left);
            }
        } else if !left.is_truthy() {
            return Ok(left);
        }

        self.evaluate(right)
    }

    fn visit_call_expr(
        &mut self,
        callee: &Expr,
        paren: &Token,
        arguments: &[Expr],
    ) -> Result<Object, Error> {
        let callee = self.evaluate(callee)?;

        let mut args = Vec::with_capacity(arguments.len());
        for argument in arguments {
            args.push(self.evaluate(argument)?);
        }

        let arity = match &callee {
            Object::Callable(function) => function.arity(),
            Object::Class(class) => class
                .borrow()
                .find_method("init")
                .map(|f| f.arity())
                .unwrap_or(0),
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
                message: format!("Expected {arity} arguments, got {}", args.len()),
            });
        }

        debug!(callee = ?paren, argc = args.len(), "call");
        match &callee {
            Object::Callable(function) => function.call(self, &args),
            Object::Class(class) => self.construct(class, &args),
            _ => unreachable!("callability already checked above"),
        }
    }

    fn visit_get_expr(&mut self, object: &Expr, name: &Token) -> Result<Object, Error> {
        let object = self.evaluate(object)?;
        if let Object::Instance(instance) = &object {
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
        object: &Expr,
        name: &Token,
        value: &Expr,
    ) -> Result<Object, Error> {
        let object = self.evaluate(object)?;
        if let Object::Instance(instance) = object {
            let value = self.evaluate(value)?;
            instance.borrow_mut().set(name, value.clone());
            Ok(value)
        } else {
            Err(Error::Runtime {
                token: name.clone(),
                message: "Only instances have fields.".to_string(),
            })
        }
    }

    fn visit_this_expr(&mut self, id: NodeId, keyword: &Token) -> Result<Object, Error> {
        self.look_up_variable(id, keyword)
    }

    fn visit_super_expr(
        &mut self,
        id: NodeId,
        keyword: &Token,
        method: &Token,
    ) -> Result<Object, Error> {
        let distance = *self
            .locals
            .get(&id)
            .expect("resolver always resolves a valid super expression locally");

        let superclass = Environment::get_at(&self.environment, distance, "super");
        let Object::Class(superclass) = superclass else {
            unreachable!("'super' always resolves to a class");
        };

        // `this` sits one scope closer to the method body than `super`.
        let instance = Environment::get_at(&self.environment, distance - 1, "this");

        let method = superclass.borrow().find_method(&method.lexeme);
        match method {
            Some(method) => Ok(Object::Callable(method.bind(instance))),
            None => Err(Error::Runtime {
                token: keyword.clone(),
                message: format!("Undefined property '{}'.", keyword.lexeme),
            }),
        }
    }
}

impl Interpreter {
    fn construct(&mut self, class: &Rc<RefCell<LoxClass>>, arguments: &[Object]) -> Result<Object, Error> {
        let instance = LoxInstance::new(class);
        let initializer = class.borrow().find_method("init");
        if let Some(initializer) = initializer {
            initializer.bind(instance.clone()).call(self, arguments)?;
        }
        Ok(instance)
    }
}

impl stmt::Visitor<()> for Interpreter {
    fn visit_block_stmt(&mut self, statements: &[Stmt]) -> Result<(), Error> {
        let environment = Rc::new(RefCell::new(Environment::from(&self.environment)));
        self.execute_block(statements, environment)
    }

    fn visit_class_stmt(
        &mut self,
        name: &Token,
        superclass: &Option<Expr>,
        methods: &[Rc<FunctionDecl>],
    ) -> Result<(), Error> {
        let superclass_obj = match superclass {
            Some(expr) => {
                let value = self.evaluate(expr)?;
                let Object::Class(class) = &value else {
                    let Expr::Variable { name, .. } = expr else {
                        unreachable!("the parser only ever produces a Variable superclass expr");
                    };
                    return Err(Error::Runtime {
                        token: name.clone(),
                        message: "Superclass must be a class.".to_string(),
                    });
                };
                Some(Rc::clone(class))
            }
            None => None,
        };

        self.environment
            .borrow_mut()
            .define(name.lexeme.clone(), Object::Null);

        // Methods close over a scope defining `super`, pushed just for this
        // class's declaration and popped again right after.
        let previous_environment = if let Some(superclass_obj) = &superclass_obj {
            let enclosing = Rc::new(RefCell::new(Environment::from(&self.environment)));
            enclosing
                .borrow_mut()
                .define("super".to_string(), Object::Class(Rc::clone(superclass_obj)));
            Some(std::mem::replace(&mut self.environment, enclosing))
        } else {
            None
        };

        let mut method_table = HashMap::new();
        for declaration in methods {
            let is_initializer = declaration.name.lexeme == "init";
            let function = Function::User {
                declaration: Rc::clone(declaration),
                closure: Rc::clone(&self.environment),
                is_initializer,
            };
            method_table.insert(declaration.name.lexeme.clone(), function);
        }

        let class = Rc::new(RefCell::new(LoxClass {
            name: name.lexeme.clone(),
            superclass: superclass_obj,
            methods: method_table,
        }));

        if let Some(previous_environment) = previous_environment {
            self.environment = previous_environment;
        }

        Environment::assign_at(&self.environment, 0, name, Object::Class(class));
        Ok(())
    }

    fn visit_expression_stmt(&mut self, expression: &Expr) -> Result<(), Error> {
        self.evaluate(expression)?;
        Ok(())
    }

    fn visit_function_stmt(&mut self, declaration: &Rc<FunctionDecl>) -> Result<(), Error> {
        let function = Function::User {
            declaration: Rc::clone(declaration),
            closure: Rc::clone(&self.environment),
            is_initializer: false,
        };
        self.environment
            .borrow_mut()
            .define(declaration.name.lexeme.clone(), Object::Callable(function));
        Ok(())
    }

    fn visit_if_stmt(
        &mut self,
        condition: &Expr,
        then_branch: &Stmt,
        else_branch: &Option<Box<Stmt>>,
    ) -> Result<(), Error> {
        if self.evaluate(condition)?.is_truthy() {
            self.execute(then_branch)
        } else if let Some(else_branch) = else_branch {
            self.execute(else_branch)
        } else {
            Ok(())
        }
    }

    fn visit_print_stmt(&mut self, expression: &Expr) -> Result<(), Error> {
        let value = self.evaluate(expression)?;
        println!("{}", value.stringify());
        Ok(())
    }

    fn visit_return_stmt(
        &mut self,
        _keyword: &Token,
        value: &Option<Expr>,
    ) -> Result<(), Error> {
        let value = match value {
            Some(expression) => self.evaluate(expression)?,
            None => Object::Null,
        };
        Err(Error::Return { value })
    }

    fn visit_var_stmt(&mut self, name: &Token, initializer: &Option<Expr>) -> Result<(), Error> {
        let value = match initializer {
            Some(expression) => self.evaluate(expression)?,
            None => Object::Null,
        };
        self.environment.borrow_mut().define(name.lexeme.clone(), value);
        Ok(())
    }

    fn visit_while_stmt(&mut self, condition: &Expr, body: &Stmt) -> Result<(), Error> {
        while self.evaluate(condition)?.is_truthy() {
            self.execute(body)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::resolver::Resolver;
    use crate::scanner::Scanner;

    fn run(source: &str) -> Interpreter {
        let mut scanner = Scanner::new(source.to_string());
        let tokens = scanner.scan_tokens().clone();
        let mut parser = Parser::new(&tokens);
        let statements = parser.parse().unwrap();
        let mut interpreter = Interpreter::new();
        {
            let mut resolver = Resolver::new(&mut interpreter);
            resolver.resolve_stmts(&statements);
        }
        interpreter.interpret(&statements).unwrap();
        interpreter
    }

    #[test]
    fn closures_capture_by_reference() {
        let interpreter = run(
            "fun counter() { var i = 0; fun inc() { i = i + 1; return i; } return inc; } \
             var a = counter();",
        );
        drop(interpreter);
    }

    #[test]
    fn division_by_zero_is_a_runtime_error() {
        let mut scanner = Scanner::new("print 1 / 0;".to_string());
        let tokens = scanner.scan_tokens().clone();
        let mut parser = Parser::new(&tokens);
        let statements = parser.parse().unwrap();
        let mut interpreter = Interpreter::new();
        let err = interpreter.interpret(&statements).unwrap_err();
        match err {
            Error::Runtime { message, .. } => assert_eq!(message, "Division by zero."),
            other => panic!("expected a runtime error, got {other:?}"),
        }
    }

    #[test]
    fn initializer_always_returns_the_bound_instance_even_with_bare_return() {
        run("class A { init() { return; } } var a = A();");
    }

    #[test]
    fn super_call_reaches_the_parent_method() {
        run(
            "class A { f() { return \"A\"; } } \
             class B < A { f() { return super.f() + \"B\"; } } \
             var b = B().f();",
        );
    }

    #[test]
    fn calling_with_wrong_arity_is_a_runtime_error() {
        let mut scanner = Scanner::new("fun f(a) { return a; } f();".to_string());
        let tokens = scanner.scan_tokens().clone();
        let mut parser = Parser::new(&tokens);
        let statements = parser.parse().unwrap();
        let mut interpreter = Interpreter::new();
        {
            let mut resolver = Resolver::new(&mut interpreter);
            resolver.resolve_stmts(&statements);
        }
        let err = interpreter.interpret(&statements).unwrap_err();
        assert!(matches!(err, Error::Runtime { .. }));
    }
}
