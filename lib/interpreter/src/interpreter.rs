use std::{
    io::{stdout, Stdout, Write},
    ops::ControlFlow,
    rc::Rc,
};

use parser::{Expr, Parser, ParseErrors, Stmt};
use scanner::{ScanError, Token, TokenType};

mod callable;
pub use callable::{Arity, Callable, Function, NativeFn, NativeFunction};

mod environment;
pub use environment::{EnvId, EnvRef, Environments};

mod natives;
pub use natives::Natives;

mod value;
pub use value::Value;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RuntimeErrorType {
    #[error("undefined variable '{0}'")]
    UndefinedVariable(String),
    #[error("operand must be number")]
    OperandMustBeNumber,
    #[error("both operands must be numbers")]
    OperandsMustBeNumbers,
    #[error("non-callable element")]
    NonCallable,
    #[error("invalid number of arguments: expected {expected} but got {got}")]
    InvalidArgumentCount { expected: Arity, got: usize },
    #[error("{0}")]
    Native(String),
}

impl RuntimeErrorType {
    fn at(self, token: &Token) -> RuntimeError {
        RuntimeError { error: self, token: token.clone() }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("[line {}] error{}: {}", .token.line(), .token.location(), .error)]
pub struct RuntimeError {
    pub error: RuntimeErrorType,
    pub token: Token,
}

#[derive(thiserror::Error, Debug)]
pub enum InterpretError {
    #[error(transparent)]
    ScanError(#[from] ScanError),
    #[error(transparent)]
    ParseErrors(#[from] ParseErrors),
    #[error(transparent)]
    RuntimeError(#[from] RuntimeError),
    #[error("unable to interpret given code: {0}")]
    Internal(#[from] std::io::Error),
}

impl InterpretError {
    /// The source never started running.
    pub fn is_compile_error(&self) -> bool {
        matches!(self, InterpretError::ScanError(_) | InterpretError::ParseErrors(_))
    }
}

/// Why evaluation stopped early.
#[derive(Debug)]
pub(crate) enum Abort {
    Runtime(RuntimeError),
    Output(std::io::Error),
}

impl From<RuntimeError> for Abort {
    fn from(error: RuntimeError) -> Self {
        Abort::Runtime(error)
    }
}

impl From<std::io::Error> for Abort {
    fn from(error: std::io::Error) -> Self {
        Abort::Output(error)
    }
}

impl From<Abort> for InterpretError {
    fn from(abort: Abort) -> Self {
        match abort {
            Abort::Runtime(error) => error.into(),
            Abort::Output(error) => error.into(),
        }
    }
}

/// `Break` carries the value of a `return` statement up to the enclosing call.
type Exec = Result<ControlFlow<Value>, Abort>;

#[derive(Debug)]
pub struct Interpreter<W = Stdout> {
    environments: Environments,
    environment: EnvId,
    output: W,
}

impl Default for Interpreter<Stdout> {
    fn default() -> Self {
        Self::new(stdout())
    }
}

impl<W: Write> Interpreter<W> {
    pub fn new(output: W) -> Self {
        Self::with_natives(Natives::default(), output)
    }

    pub fn with_natives(natives: Natives, output: W) -> Self {
        let mut environments = Environments::default();
        for native in natives {
            let name = native.name.clone();
            environments.define(Environments::GLOBAL, &name, Callable::Native(native).into());
        }

        Self { environments, environment: Environments::GLOBAL, output }
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Scans, parses and runs `source`. Globals defined by earlier runs stay visible.
    pub fn run_source(&mut self, source: &str) -> Result<(), InterpretError> {
        let tokens = scanner::scan(source)?;
        let stmts = Parser::new(tokens).parse()?;
        self.interpret(&stmts)
    }

    pub fn interpret(&mut self, stmts: &[Stmt]) -> Result<(), InterpretError> {
        for stmt in stmts {
            // The parser rejects top-level `return`s; one in a hand-built program ends it.
            if self.execute(stmt)?.is_break() {
                break;
            }
        }
        Ok(())
    }

    fn execute(&mut self, stmt: &Stmt) -> Exec {
        match stmt {
            Stmt::Expression(expr) => {
                self.evaluate(expr)?;
            }
            Stmt::Print(expr) => {
                let value = self.evaluate(expr)?;
                writeln!(self.output, "{}", value)?;
            }
            Stmt::Var { name, initializer } => {
                let value = match initializer {
                    Some(init) => self.evaluate(init)?,
                    None => Value::Nil,
                };
                self.environments.define(self.environment, name.lexeme(), value);
            }
            Stmt::Block(stmts) => {
                let env = self.environments.push(self.environment);
                return self.execute_block(stmts, env);
            }
            Stmt::If { condition, then_branch, else_branch } => {
                if self.evaluate(condition)?.is_truthy() {
                    return self.execute(then_branch);
                } else if let Some(else_branch) = else_branch {
                    return self.execute(else_branch);
                }
            }
            Stmt::While { condition, body } => {
                while self.evaluate(condition)?.is_truthy() {
                    if let flow @ ControlFlow::Break(_) = self.execute(body)? {
                        return Ok(flow);
                    }
                }
            }
            Stmt::Function(declaration) => {
                let closure = self.environments.capture(self.environment);
                let function = Function { declaration: Rc::clone(declaration), closure };
                log::debug!("Declared {} in {}", function, self.environment);
                self.environments.define(
                    self.environment,
                    declaration.name.lexeme(),
                    Callable::Function(function).into(),
                );
            }
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(value) => self.evaluate(value)?,
                    None => Value::Nil,
                };
                return Ok(ControlFlow::Break(value));
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    /// Runs `stmts` with `env` as the active scope, then restores the previous one and
    /// releases `env`, whether or not execution succeeded.
    fn execute_block(&mut self, stmts: &[Stmt], env: EnvId) -> Exec {
        let previous = std::mem::replace(&mut self.environment, env);

        let mut result = Ok(ControlFlow::Continue(()));
        for stmt in stmts {
            result = self.execute(stmt);
            if !matches!(result, Ok(ControlFlow::Continue(()))) {
                break;
            }
        }

        self.environment = previous;
        self.environments.release(env);
        result
    }

    pub(crate) fn call_function(
        &mut self,
        function: &Function,
        arguments: Vec<Value>,
    ) -> Result<Value, Abort> {
        let env = self.environments.push(function.closure.id());
        for (param, argument) in function.declaration.params.iter().zip(arguments) {
            self.environments.define(env, param.lexeme(), argument);
        }

        log::trace!("Calling {} in {}", function, env);

        match self.execute_block(&function.declaration.body, env)? {
            ControlFlow::Break(value) => Ok(value),
            ControlFlow::Continue(()) => Ok(Value::Nil),
        }
    }

    fn evaluate(&mut self, expr: &Expr) -> Result<Value, Abort> {
        match expr {
            Expr::Literal(literal) => Ok(literal.into()),

            Expr::Grouping(expr) => self.evaluate(expr),

            Expr::Variable(name) => match self.environments.get(self.environment, name) {
                Some(value) => Ok(value.clone()),
                None => Err(RuntimeErrorType::UndefinedVariable(name.lexeme().to_string())
                    .at(name)
                    .into()),
            },

            Expr::Assign { name, value } => {
                let value = self.evaluate(value)?;
                if self.environments.assign(self.environment, name, value.clone()) {
                    Ok(value)
                } else {
                    Err(RuntimeErrorType::UndefinedVariable(name.lexeme().to_string())
                        .at(name)
                        .into())
                }
            }

            Expr::Logical { left, operator, right } => {
                let left = self.evaluate(left)?;
                let short_circuits = match operator.ty() {
                    TokenType::Or => left.is_truthy(),
                    _ => !left.is_truthy(),
                };

                if short_circuits {
                    Ok(left)
                } else {
                    self.evaluate(right)
                }
            }

            Expr::Unary { operator, right } => {
                let right = self.evaluate(right)?;
                match (operator.ty(), right) {
                    (TokenType::Bang, v) => Ok((!v.is_truthy()).into()),
                    (TokenType::Minus, Value::Number(n)) => Ok((-n).into()),
                    _ => Err(RuntimeErrorType::OperandMustBeNumber.at(operator).into()),
                }
            }

            Expr::Binary { left, operator, right } => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                Ok(binary(operator, left, right)?)
            }

            Expr::Call { callee, closing_paren, arguments } => {
                let callee = self.evaluate(callee)?;

                let arguments = arguments
                    .iter()
                    .map(|argument| self.evaluate(argument))
                    .collect::<Result<Vec<_>, _>>()?;

                let Value::Callable(callable) = callee else {
                    return Err(RuntimeErrorType::NonCallable.at(closing_paren).into());
                };

                let arity = callable.arity();
                if arity.0 != arguments.len() {
                    return Err(RuntimeErrorType::InvalidArgumentCount {
                        expected: arity,
                        got: arguments.len(),
                    }
                    .at(closing_paren)
                    .into());
                }

                callable.call(self, closing_paren, arguments)
            }
        }
    }
}

/// Strings support `+`, `==` and `!=` among themselves. Every other combination needs two
/// numbers, equality included.
fn binary(operator: &Token, left: Value, right: Value) -> Result<Value, RuntimeError> {
    use TokenType::*;

    if let (Value::Str(l), Value::Str(r)) = (&left, &right) {
        match operator.ty() {
            Plus => return Ok(format!("{l}{r}").into()),
            EqualEqual => return Ok((l == r).into()),
            BangEqual => return Ok((l != r).into()),
            _ => {}
        }
    }

    let (Value::Number(l), Value::Number(r)) = (left, right) else {
        return Err(RuntimeErrorType::OperandsMustBeNumbers.at(operator));
    };

    Ok(match operator.ty() {
        Plus => (l + r).into(),
        Minus => (l - r).into(),
        Star => (l * r).into(),
        // IEEE semantics: dividing by zero yields inf or NaN.
        Slash => (l / r).into(),
        Greater => (l > r).into(),
        GreaterEqual => (l >= r).into(),
        Less => (l < r).into(),
        LessEqual => (l <= r).into(),
        EqualEqual => (l == r).into(),
        BangEqual => (l != r).into(),
        _ => unreachable!("{} is not a binary operator", operator),
    })
}
