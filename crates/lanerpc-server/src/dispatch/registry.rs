//! Method descriptors and the registration table an API fills in.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use super::handler::{ContextHandler, Handler, MethodResult, ParamSpec};
use super::params::{Arg, ParamKind};
use crate::context::CallContext;

/// Name of the resolver hook; never dispatchable.
pub const RESERVED_METHOD: &str = "RuntimeMethod";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("method name cannot be empty")]
    EmptyName,

    #[error("method name '{0}' is reserved")]
    Reserved(String),

    #[error("method '{0}' is already registered")]
    Duplicate(String),
}

pub type Result<T> = std::result::Result<T, RegistryError>;

/// Canonical form of a method name: the first character upper-cased.
pub fn exported_name(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub type Invoker =
    Arc<dyn Fn(CallContext, Vec<Arg>) -> BoxFuture<'static, MethodResult> + Send + Sync>;

/// A type-erased callable plus the parameter list it declares.
#[derive(Clone)]
pub struct MethodDescriptor {
    name: String,
    params: Vec<ParamKind>,
    takes_context: bool,
    optional_tail: bool,
    invoke: Invoker,
}

impl MethodDescriptor {
    pub fn new<A, T, H>(name: impl Into<String>, api: Arc<A>, handler: H) -> Self
    where
        A: Send + Sync + 'static,
        H: Handler<A, T>,
    {
        let specs = <H as Handler<A, T>>::param_specs();
        let invoke: Invoker = Arc::new(move |ctx: CallContext, args: Vec<Arg>| {
            <H as Handler<A, T>>::call(handler.clone(), api.clone(), ctx, args)
        });
        Self::from_specs(name.into(), specs, false, invoke)
    }

    pub fn with_context<A, T, H>(name: impl Into<String>, api: Arc<A>, handler: H) -> Self
    where
        A: Send + Sync + 'static,
        H: ContextHandler<A, T>,
    {
        let specs = <H as ContextHandler<A, T>>::param_specs();
        let invoke: Invoker = Arc::new(move |ctx: CallContext, args: Vec<Arg>| {
            <H as ContextHandler<A, T>>::call(handler.clone(), api.clone(), ctx, args)
        });
        Self::from_specs(name.into(), specs, true, invoke)
    }

    /// Build a descriptor from an explicit parameter list and invoker.
    pub fn from_parts(
        name: impl Into<String>,
        params: Vec<ParamKind>,
        takes_context: bool,
        optional_tail: bool,
        invoke: Invoker,
    ) -> Self {
        Self {
            name: name.into(),
            params,
            takes_context,
            optional_tail,
            invoke,
        }
    }

    fn from_specs(
        name: String,
        specs: Vec<ParamSpec>,
        takes_context: bool,
        invoke: Invoker,
    ) -> Self {
        let optional_tail = specs.last().is_some_and(|spec| spec.optional);
        let params = specs.into_iter().map(|spec| spec.kind).collect();
        Self::from_parts(name, params, takes_context, optional_tail, invoke)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared wire parameters, excluding the context.
    pub fn params(&self) -> &[ParamKind] {
        &self.params
    }

    pub fn takes_context(&self) -> bool {
        self.takes_context
    }

    pub fn has_optional_tail(&self) -> bool {
        self.optional_tail
    }

    pub(crate) fn invoke(
        &self,
        ctx: CallContext,
        args: Vec<Arg>,
    ) -> BoxFuture<'static, MethodResult> {
        (self.invoke)(ctx, args)
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("takes_context", &self.takes_context)
            .field("optional_tail", &self.optional_tail)
            .finish_non_exhaustive()
    }
}

/// Collects the methods an API exposes, keyed by exported name.
pub struct MethodTable<A> {
    api: Arc<A>,
    methods: HashMap<String, Arc<MethodDescriptor>>,
}

impl<A: Send + Sync + 'static> MethodTable<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self {
            api,
            methods: HashMap::new(),
        }
    }

    pub fn method<T, H>(&mut self, name: &str, handler: H) -> Result<&mut Self>
    where
        H: Handler<A, T>,
    {
        let descriptor = MethodDescriptor::new(name, self.api.clone(), handler);
        self.insert(descriptor)
    }

    pub fn method_with_context<T, H>(&mut self, name: &str, handler: H) -> Result<&mut Self>
    where
        H: ContextHandler<A, T>,
    {
        let descriptor = MethodDescriptor::with_context(name, self.api.clone(), handler);
        self.insert(descriptor)
    }

    pub fn insert(&mut self, descriptor: MethodDescriptor) -> Result<&mut Self> {
        let key = exported_name(descriptor.name());
        if key.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if key == RESERVED_METHOD {
            return Err(RegistryError::Reserved(descriptor.name().to_string()));
        }
        if self.methods.contains_key(&key) {
            return Err(RegistryError::Duplicate(descriptor.name().to_string()));
        }

        tracing::debug!("Registered method {}", descriptor.name());
        self.methods.insert(key, Arc::new(descriptor));
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    pub(crate) fn into_methods(self) -> HashMap<String, Arc<MethodDescriptor>> {
        self.methods
    }
}

impl<A> fmt::Debug for MethodTable<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodTable")
            .field("methods", &self.methods)
            .finish_non_exhaustive()
    }
}

/// An object whose methods are served over JSON-RPC.
pub trait RpcApi: Send + Sync + Sized + 'static {
    /// Register every statically known method.
    fn register(table: &mut MethodTable<Self>) -> Result<()>;

    /// Resolve a method that is not in the table, e.g. a namespaced family.
    /// Receives the name exactly as sent by the caller.
    fn runtime_method(api: &Arc<Self>, name: &str) -> Option<MethodDescriptor> {
        let _ = (api, name);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::OptionalParams;

    struct Api;

    async fn noop(_api: Arc<Api>) {}

    async fn with_tail(_api: Arc<Api>, _id: u64, _opts: OptionalParams) {}

    #[test]
    fn test_exported_name() {
        assert_eq!(exported_name("mock_methodA"), "Mock_methodA");
        assert_eq!(exported_name("Ping"), "Ping");
        assert_eq!(exported_name("éclair"), "Éclair");
        assert_eq!(exported_name(""), "");
    }

    #[test]
    fn test_reserved_and_duplicate_names() {
        let mut table = MethodTable::new(Arc::new(Api));
        table.method("ping", noop).unwrap();

        assert_eq!(
            table.method("Ping", noop).unwrap_err(),
            RegistryError::Duplicate("Ping".to_string())
        );
        assert_eq!(
            table.method("runtimeMethod", noop).unwrap_err(),
            RegistryError::Reserved("runtimeMethod".to_string())
        );
        assert_eq!(table.method("", noop).unwrap_err(), RegistryError::EmptyName);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_optional_tail_detected() {
        let descriptor = MethodDescriptor::new("with_tail", Arc::new(Api), with_tail);
        assert_eq!(descriptor.params(), &[ParamKind::U64, ParamKind::Map]);
        assert!(descriptor.has_optional_tail());
        assert!(!descriptor.takes_context());

        let descriptor = MethodDescriptor::new("noop", Arc::new(Api), noop);
        assert!(descriptor.params().is_empty());
        assert!(!descriptor.has_optional_tail());
    }
}
