//! Typed handler functions and the conversions around them.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::{Map, Value};

use super::params::{Arg, FromArg, ParamKind};
use crate::context::CallContext;

/// The non-error values a method returned, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Output(Vec<Value>);

impl Output {
    pub fn none() -> Self {
        Self(Vec::new())
    }

    pub fn one(value: Value) -> Self {
        Self(vec![value])
    }

    pub fn many(values: Vec<Value>) -> Self {
        Self(values)
    }

    /// No values become `""`, one value is unwrapped, more become an array.
    pub fn into_result(self) -> Value {
        let mut values = self.0;
        match values.len() {
            0 => Value::String(String::new()),
            1 => values.remove(0),
            _ => Value::Array(values),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MethodError {
    /// The method ran and reported a failure of its own.
    #[error("{0}")]
    Application(anyhow::Error),

    #[error("failed to encode return value: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("argument does not match declared kind {0}")]
    Binding(ParamKind),
}

pub type MethodResult = std::result::Result<Output, MethodError>;

/// Wraps any serializable value returned as a single result.
#[derive(Debug, Clone)]
pub struct Json<T>(pub T);

pub trait IntoOutput {
    fn into_output(self) -> Result<Output, serde_json::Error>;
}

impl IntoOutput for () {
    fn into_output(self) -> Result<Output, serde_json::Error> {
        Ok(Output::none())
    }
}

impl IntoOutput for Output {
    fn into_output(self) -> Result<Output, serde_json::Error> {
        Ok(self)
    }
}

impl<T: Serialize> IntoOutput for Json<T> {
    fn into_output(self) -> Result<Output, serde_json::Error> {
        Ok(Output::one(serde_json::to_value(self.0)?))
    }
}

macro_rules! impl_into_output_single {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoOutput for $ty {
                fn into_output(self) -> Result<Output, serde_json::Error> {
                    Ok(Output::one(serde_json::to_value(self)?))
                }
            }
        )*
    };
}

impl_into_output_single!(
    Value,
    Map<String, Value>,
    String,
    &'static str,
    bool,
    i8,
    i16,
    i32,
    i64,
    isize,
    u8,
    u16,
    u32,
    u64,
    usize,
    f32,
    f64,
);

impl<T: Serialize> IntoOutput for Vec<T> {
    fn into_output(self) -> Result<Output, serde_json::Error> {
        Ok(Output::one(serde_json::to_value(self)?))
    }
}

impl<T: Serialize> IntoOutput for Option<T> {
    fn into_output(self) -> Result<Output, serde_json::Error> {
        Ok(Output::one(serde_json::to_value(self)?))
    }
}

macro_rules! impl_into_output_tuple {
    ($($ty:ident),+) => {
        #[allow(non_snake_case)]
        impl<$($ty: Serialize,)+> IntoOutput for ($($ty,)+) {
            fn into_output(self) -> Result<Output, serde_json::Error> {
                let ($($ty,)+) = self;
                Ok(Output::many(vec![$(serde_json::to_value($ty)?,)+]))
            }
        }
    };
}

impl_into_output_tuple!(T1, T2);
impl_into_output_tuple!(T1, T2, T3);
impl_into_output_tuple!(T1, T2, T3, T4);
impl_into_output_tuple!(T1, T2, T3, T4, T5);

/// What a handler's future resolves to.
pub trait IntoMethodResult {
    fn into_method_result(self) -> MethodResult;
}

impl IntoMethodResult for () {
    fn into_method_result(self) -> MethodResult {
        Ok(Output::none())
    }
}

impl<O: IntoOutput> IntoMethodResult for anyhow::Result<O> {
    fn into_method_result(self) -> MethodResult {
        match self {
            Ok(output) => output.into_output().map_err(MethodError::Encode),
            Err(e) => Err(MethodError::Application(e)),
        }
    }
}

/// Declared shape of one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub kind: ParamKind,
    pub optional: bool,
}

impl ParamSpec {
    pub fn of<T: FromArg>() -> Self {
        Self {
            kind: T::KIND,
            optional: T::OPTIONAL,
        }
    }
}

/// An async function `fn(Arc<A>, T1, .., Tn)` callable with bound arguments.
pub trait Handler<A, T>: Clone + Send + Sync + Sized + 'static {
    fn param_specs() -> Vec<ParamSpec>;

    fn call(self, api: Arc<A>, ctx: CallContext, args: Vec<Arg>)
        -> BoxFuture<'static, MethodResult>;
}

/// An async function `fn(Arc<A>, CallContext, T1, .., Tn)`; the context is
/// supplied by the dispatcher, never by the wire payload.
pub trait ContextHandler<A, T>: Clone + Send + Sync + Sized + 'static {
    fn param_specs() -> Vec<ParamSpec>;

    fn call(self, api: Arc<A>, ctx: CallContext, args: Vec<Arg>)
        -> BoxFuture<'static, MethodResult>;
}

fn take<T: FromArg>(args: &mut impl Iterator<Item = Arg>) -> Result<T, MethodError> {
    args.next()
        .and_then(T::from_arg)
        .ok_or(MethodError::Binding(T::KIND))
}

macro_rules! impl_handlers {
    ($($ty:ident),*) => {
        #[allow(non_snake_case, unused_mut, unused_variables)]
        impl<A, F, Fut, R, $($ty,)*> Handler<A, ($($ty,)*)> for F
        where
            A: Send + Sync + 'static,
            F: Fn(Arc<A>, $($ty,)*) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = R> + Send + 'static,
            R: IntoMethodResult,
            $($ty: FromArg,)*
        {
            fn param_specs() -> Vec<ParamSpec> {
                vec![$(ParamSpec::of::<$ty>(),)*]
            }

            fn call(
                self,
                api: Arc<A>,
                _ctx: CallContext,
                args: Vec<Arg>,
            ) -> BoxFuture<'static, MethodResult> {
                Box::pin(async move {
                    let mut args = args.into_iter();
                    $(let $ty = take::<$ty>(&mut args)?;)*
                    self(api, $($ty,)*).await.into_method_result()
                })
            }
        }

        #[allow(non_snake_case, unused_mut, unused_variables)]
        impl<A, F, Fut, R, $($ty,)*> ContextHandler<A, ($($ty,)*)> for F
        where
            A: Send + Sync + 'static,
            F: Fn(Arc<A>, CallContext, $($ty,)*) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = R> + Send + 'static,
            R: IntoMethodResult,
            $($ty: FromArg,)*
        {
            fn param_specs() -> Vec<ParamSpec> {
                vec![$(ParamSpec::of::<$ty>(),)*]
            }

            fn call(
                self,
                api: Arc<A>,
                ctx: CallContext,
                args: Vec<Arg>,
            ) -> BoxFuture<'static, MethodResult> {
                Box::pin(async move {
                    let mut args = args.into_iter();
                    $(let $ty = take::<$ty>(&mut args)?;)*
                    self(api, ctx, $($ty,)*).await.into_method_result()
                })
            }
        }
    };
}

impl_handlers!();
impl_handlers!(T1);
impl_handlers!(T1, T2);
impl_handlers!(T1, T2, T3);
impl_handlers!(T1, T2, T3, T4);
impl_handlers!(T1, T2, T3, T4, T5);
impl_handlers!(T1, T2, T3, T4, T5, T6);
impl_handlers!(T1, T2, T3, T4, T5, T6, T7);
impl_handlers!(T1, T2, T3, T4, T5, T6, T7, T8);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Transport;
    use serde_json::json;

    struct Calc;

    async fn add(_api: Arc<Calc>, a: i64, b: i64) -> anyhow::Result<i64> {
        Ok(a + b)
    }

    async fn whoami(_api: Arc<Calc>, ctx: CallContext) -> anyhow::Result<String> {
        Ok(ctx.trace_id().to_string())
    }

    fn specs<T, H: Handler<Calc, T>>(_: &H) -> Vec<ParamSpec> {
        H::param_specs()
    }

    #[test]
    fn test_output_shaping() {
        assert_eq!(Output::none().into_result(), json!(""));
        assert_eq!(Output::one(json!(5)).into_result(), json!(5));
        assert_eq!(
            Output::many(vec![json!("a"), json!(1)]).into_result(),
            json!(["a", 1])
        );
    }

    #[test]
    fn test_tuple_output_keeps_order() {
        let output = ("success", 15u64, true).into_output().unwrap();
        assert_eq!(output.into_result(), json!(["success", 15, true]));
    }

    #[test]
    fn test_application_error_message() {
        let result: anyhow::Result<String> = Err(anyhow::anyhow!("boom"));
        let err = result.into_method_result().unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_param_specs_follow_signature() {
        let specs = specs(&add);
        assert_eq!(specs.len(), 2);
        assert!(specs.iter().all(|s| s.kind == ParamKind::I64 && !s.optional));
    }

    #[tokio::test]
    async fn test_call_binds_arguments() {
        let ctx = CallContext::new("t", Transport::Internal);
        let out = Handler::call(add, Arc::new(Calc), ctx, vec![Arg::I64(2), Arg::I64(3)])
            .await
            .unwrap();
        assert_eq!(out.into_result(), json!(5));
    }

    #[tokio::test]
    async fn test_context_handler_receives_context() {
        let ctx = CallContext::new("trace-1", Transport::Internal);
        let out = ContextHandler::call(whoami, Arc::new(Calc), ctx, vec![])
            .await
            .unwrap();
        assert_eq!(out.into_result(), json!("trace-1"));
    }

    #[tokio::test]
    async fn test_mismatched_argument_is_a_binding_error() {
        let ctx = CallContext::new("t", Transport::Internal);
        let err = Handler::call(add, Arc::new(Calc), ctx, vec![Arg::Bool(true), Arg::I64(3)])
            .await
            .unwrap_err();
        assert!(matches!(err, MethodError::Binding(ParamKind::I64)));
    }
}
