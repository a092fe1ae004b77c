use std::collections::HashMap;

use crate::error::{parser_error, Error};
use crate::interpreter::Interpreter;
use crate::syntax::{expr, stmt, Expr, FunctionDecl, LiteralValue, NodeId, Stmt};
use crate::token::Token;

// Much like scopes are tracked while walking the tree, we track whether the
// code currently being visited is inside a function declaration, and which
// kind, since `return` and `this`/`super` are only legal in some of them.
#[derive(Debug, Clone, Copy, PartialEq)]
enum FunctionType {
    None,
    Function,
    Initializer,
    Method,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ClassType {
    None,
    Class,
    Subclass,
}

pub struct Resolver<'i> {
    interpreter: &'i mut Interpreter,
    // Only local block scopes are tracked here. A variable declared at the
    // top level is not tracked by the resolver at all - it resolves
    // dynamically against globals. Keys are variable names; the value
    // records whether the binding has finished resolving its initializer.
    scopes: Vec<HashMap<String, bool>>,
    current_function: FunctionType,
    current_class: ClassType,
    // At least one diagnostic must cause the overall run to fail; the
    // resolver keeps walking after reporting one so it can surface more.
    pub had_error: bool,
}

impl<'i> Resolver<'i> {
    pub fn new(interpreter: &'i mut Interpreter) -> Self {
        Resolver {
            interpreter,
            scopes: Vec::new(),
            current_function: FunctionType::None,
            current_class: ClassType::None,
            had_error: false,
        }
    }

    fn error(&mut self, token: &Token, message: &str) {
        self.had_error = true;
        parser_error(token, message);
    }

    fn resolve_stmt(&mut self, statement: &Stmt) {
        let _: Result<(), Error> = statement.accept(self);
    }

    pub fn resolve_stmts(&mut self, statements: &[Stmt]) {
        for statement in statements {
            self.resolve_stmt(statement)
        }
    }

    fn resolve_expr(&mut self, expression: &Expr) {
        let _: Result<(), Error> = expression.accept(self);
    }

    fn begin_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    // Adds the variable to the innermost scope, marked not-yet-ready
    // (`false`). This is what lets `var a = a;` be caught as an error:
    // the name exists in scope but isn't defined until its initializer
    // finishes.
    fn declare(&mut self, name: &Token) {
        if let Some(scope) = self.scopes.last_mut() {
            if scope.contains_key(&name.lexeme) {
                self.error(
                    name,
                    &format!("Already a variable '{}' in this scope.", name.lexeme),
                );
            }
            scope.insert(name.lexeme.clone(), false);
        }
    }

    fn define(&mut self, name: &Token) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.lexeme.clone(), true);
        }
    }

    // Walks scopes innermost-to-outermost; on the first hit at index `i`
    // publishes `(id, i)` into the interpreter's distance map and stops -
    // a miss leaves the node unresolved, which means global at evaluation
    // time.
    fn resolve_local(&mut self, id: NodeId, name: &Token) {
        for (i, scope) in self.scopes.iter().rev().enumerate() {
            if scope.contains_key(&name.lexeme) {
                self.interpreter.resolve(id, i);
                return;
            }
        }
    }

    // Creates a new scope for the body, binds each parameter into it, then
    // resolves the body inside that scope. Unlike the evaluator, which
    // doesn't touch a function's body until it's called, the resolver
    // walks into it immediately.
    fn resolve_function(&mut self, params: &[Token], body: &[Stmt], kind: FunctionType) {
        let enclosing_function = self.current_function;
        self.current_function = kind;
        self.begin_scope();
        for param in params {
            self.declare(param);
            self.define(param);
        }
        self.resolve_stmts(body);
        self.end_scope();
        self.current_function = enclosing_function;
    }
}

impl<'i> expr::Visitor<()> for Resolver<'i> {
    fn visit_variable_expr(&mut self, id: NodeId, name: &Token) -> Result<(), Error> {
        if let Some(scope) = self.scopes.last() {
            if let Some(false) = scope.get(&name.lexeme).copied() {
                self.error(name, "Can't read local variable in its own initializer.");
            }
        }
        self.resolve_local(id, name);
        Ok(())
    }

    fn visit_assign_expr(
        &mut self,
        id: NodeId,
        name: &Token,
        value: &Expr,
    ) -> Result<(), Error> {
        self.resolve_expr(value);
        self.resolve_local(id, name);
        Ok(())
    }

    fn visit_binary_expr(
        &mut self,
        left: &Expr,
        _operator: &Token,
        right: &Expr,
    ) -> Result<(), Error> {
        self.resolve_expr(left);
        self.resolve_expr(right);
        Ok(())
    }

    // Only the expression to the left of the dot is resolved here; the
    // property name itself is looked up dynamically at call time.
    fn visit_get_expr(&mut self, object: &Expr, _name: &Token) -> Result<(), Error> {
        self.resolve_expr(object);
        Ok(())
    }

    fn visit_set_expr(
        &mut self,
        object: &Expr,
        _name: &Token,
        value: &Expr,
    ) -> Result<(), Error> {
        self.resolve_expr(value);
        self.resolve_expr(object);
        Ok(())
    }

    fn visit_this_expr(&mut self, id: NodeId, keyword: &Token) -> Result<(), Error> {
        if self.current_class == ClassType::None {
            self.error(keyword, "Can't use 'this' outside of a class.");
            return Ok(());
        }
        self.resolve_local(id, keyword);
        Ok(())
    }

    fn visit_super_expr(
        &mut self,
        id: NodeId,
        keyword: &Token,
        _method: &Token,
    ) -> Result<(), Error> {
        match self.current_class {
            ClassType::None => {
                self.error(keyword, "Can't use 'super' outside of a class.");
            }
            ClassType::Class => {
                self.error(keyword, "Can't use 'super' in a class with no superclass.");
            }
            ClassType::Subclass => self.resolve_local(id, keyword),
        }
        Ok(())
    }

    fn visit_call_expr(
        &mut self,
        callee: &Expr,
        _paren: &Token,
        arguments: &[Expr],
    ) -> Result<(), Error> {
        self.resolve_expr(callee);
        for argument in arguments {
            self.resolve_expr(argument);
        }
        Ok(())
    }

    fn visit_grouping_expr(&mut self, expression: &Expr) -> Result<(), Error> {
        self.resolve_expr(expression);
        Ok(())
    }

    fn visit_literal_expr(&mut self, _value: &LiteralValue) -> Result<(), Error> {
        Ok(())
    }

    // No control flow or short-circuiting happens during static analysis, so
    // logical expressions resolve exactly like any other binary operator.
    fn visit_logical_expr(
        &mut self,
        left: &Expr,
        _operator: &Token,
        right: &Expr,
    ) -> Result<(), Error> {
        self.resolve_expr(left);
        self.resolve_expr(right);
        Ok(())
    }

    fn visit_unary_expr(&mut self, _operator: &Token, right: &Expr) -> Result<(), Error> {
        self.resolve_expr(right);
        Ok(())
    }
}

impl<'i> stmt::Visitor<()> for Resolver<'i> {
    fn visit_block_stmt(&mut self, statements: &[Stmt]) -> Result<(), Error> {
        self.begin_scope();
        self.resolve_stmts(statements);
        self.end_scope();
        Ok(())
    }

    // A `this` expression inside a method resolves as though it were a
    // local variable declared in an implicit scope wrapped just outside the
    // method body; a `super` expression gets one more scope outside that,
    // present only when the class has a superclass.
    fn visit_class_stmt(
        &mut self,
        name: &Token,
        superclass: &Option<Expr>,
        methods: &[std::rc::Rc<FunctionDecl>],
    ) -> Result<(), Error> {
        let enclosing_class = self.current_class;
        self.current_class = ClassType::Class;

        self.declare(name);
        self.define(name);

        if let Some(Expr::Variable {
            id: super_id,
            name: super_name,
        }) = superclass
        {
            if super_name.lexeme == name.lexeme {
                self.error(super_name, "A class can't inherit from itself.");
            }
            self.current_class = ClassType::Subclass;
            self.resolve_local(*super_id, super_name);

            self.begin_scope();
            self.scopes
                .last_mut()
                .expect("scope just pushed")
                .insert("super".to_string(), true);
        }

        self.begin_scope();
        self.scopes
            .last_mut()
            .expect("scope just pushed")
            .insert("this".to_string(), true);

        for method in methods {
            let kind = if method.name.lexeme == "init" {
                FunctionType::Initializer
            } else {
                FunctionType::Method
            };
            self.resolve_function(&method.params, &method.body, kind);
        }

        self.end_scope();

        if superclass.is_some() {
            self.end_scope();
        }

        self.current_class = enclosing_class;
        Ok(())
    }

    fn visit_expression_stmt(&mut self, expression: &Expr) -> Result<(), Error> {
        self.resolve_expr(expression);
        Ok(())
    }

    fn visit_if_stmt(
        &mut self,
        condition: &Expr,
        then_branch: &Stmt,
        else_branch: &Option<Box<Stmt>>,
    ) -> Result<(), Error> {
        self.resolve_expr(condition);
        self.resolve_stmt(then_branch);
        if let Some(else_stmt) = else_branch {
            self.resolve_stmt(else_stmt);
        }
        Ok(())
    }

    fn visit_print_stmt(&mut self, expression: &Expr) -> Result<(), Error> {
        self.resolve_expr(expression);
        Ok(())
    }

    fn visit_return_stmt(
        &mut self,
        keyword: &Token,
        value: &Option<Expr>,
    ) -> Result<(), Error> {
        if self.current_function == FunctionType::None {
            self.error(keyword, "Can't return from top-level code.");
        }

        if let Some(return_value) = value {
            if self.current_function == FunctionType::Initializer {
                self.error(keyword, "Can't return a value from an initializer.");
            }
            self.resolve_expr(return_value);
        }
        Ok(())
    }

    fn visit_while_stmt(&mut self, condition: &Expr, body: &Stmt) -> Result<(), Error> {
        self.resolve_expr(condition);
        self.resolve_stmt(body);
        Ok(())
    }

    // Split into declare-then-define so `var a = a;` can be caught: the
    // name exists in scope (declared) but isn't ready (not yet defined)
    // while its own initializer is resolved.
    fn visit_var_stmt(&mut self, name: &Token, initializer: &Option<Expr>) -> Result<(), Error> {
        self.declare(name);
        if let Some(init) = initializer {
            self.resolve_expr(init);
        }
        self.define(name);
        Ok(())
    }

    // Declares and defines the function's own name eagerly, before
    // resolving its body, so the body can refer to the function recursively.
    fn visit_function_stmt(
        &mut self,
        declaration: &std::rc::Rc<FunctionDecl>,
    ) -> Result<(), Error> {
        self.declare(&declaration.name);
        self.define(&declaration.name);

        self.resolve_function(&declaration.params, &declaration.body, FunctionType::Function);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::scanner::Scanner;

    fn run(source: &str) -> Interpreter {
        let mut scanner = Scanner::new(source.to_string());
        let tokens = scanner.scan_tokens().clone();
        let mut parser = Parser::new(&tokens);
        let stmts = parser.parse().unwrap();
        let mut interpreter = Interpreter::new();
        {
            let mut resolver = Resolver::new(&mut interpreter);
            resolver.resolve_stmts(&stmts);
        }
        interpreter
    }

    #[test]
    fn redeclaration_in_same_block_is_reported_but_shadowing_in_inner_block_is_not() {
        // Resolver errors only print to stderr; this test only exercises
        // that resolving doesn't panic on either form.
        run("{ var a = 1; var a = 2; }");
        run("var a = 1; { var a = a; }");
    }

    #[test]
    fn resolving_does_not_panic_on_class_with_superclass_and_super_call() {
        run("class A { f() { return 1; } } class B < A { f() { return super.f(); } }");
    }
}
