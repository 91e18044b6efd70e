use std::{
    fmt::{self, Debug, Display, Formatter},
    io::Write,
    rc::Rc,
};

use parser::FunctionDecl;
use scanner::Token;

use crate::{environment::EnvRef, Abort, Interpreter, RuntimeErrorType, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display, derive_more::From)]
pub struct Arity(pub usize);

/// A native body. Failures surface as runtime errors at the call's closing paren.
pub type NativeFn = dyn Fn(&[Value]) -> Result<Value, RuntimeErrorType>;

/// A function implemented by the host.
#[derive(Clone)]
pub struct NativeFunction {
    pub name: Rc<str>,
    pub arity: Arity,
    fun: Rc<NativeFn>,
}

impl NativeFunction {
    pub fn new(
        name: &str,
        arity: Arity,
        fun: impl Fn(&[Value]) -> Result<Value, RuntimeErrorType> + 'static,
    ) -> Self {
        Self { name: name.into(), arity, fun: Rc::new(fun) }
    }

    pub fn call(&self, arguments: &[Value]) -> Result<Value, RuntimeErrorType> {
        (self.fun)(arguments)
    }
}

impl Debug for NativeFunction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

impl PartialEq for NativeFunction {
    fn eq(&self, other: &Self) -> bool {
        Rc::as_ptr(&self.fun).cast::<()>() == Rc::as_ptr(&other.fun).cast::<()>()
    }
}

/// A user-defined function together with the scope it was declared in.
#[derive(Debug, Clone)]
pub struct Function {
    pub declaration: Rc<FunctionDecl>,
    pub closure: EnvRef,
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.declaration, &other.declaration) && self.closure == other.closure
    }
}

impl Display for Function {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "<fn {}>", self.declaration.name.lexeme())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Callable {
    Native(NativeFunction),
    Function(Function),
}

impl Callable {
    pub fn arity(&self) -> Arity {
        match self {
            Callable::Native(native) => native.arity,
            Callable::Function(function) => Arity(function.declaration.params.len()),
        }
    }

    /// The argument count has already been checked against `arity()`.
    pub(crate) fn call<W: Write>(
        &self,
        interpreter: &mut Interpreter<W>,
        closing_paren: &Token,
        arguments: Vec<Value>,
    ) -> Result<Value, Abort> {
        match self {
            Callable::Native(native) => {
                native.call(&arguments).map_err(|error| error.at(closing_paren).into())
            }
            Callable::Function(function) => interpreter.call_function(function, arguments),
        }
    }
}

impl Display for Callable {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Native(_) => write!(f, "<native fn>"),
            Callable::Function(function) => write!(f, "{}", function),
        }
    }
}
