use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

pub(super) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What an invocation produces: a JSON result, or the message text that
/// crosses back to the caller.
pub(super) type Outcome = std::result::Result<Value, String>;

/// Type-erased async operation.
pub(super) trait HandlerFn: Send + Sync {
    fn call(&self, method: &str, args: Vec<Value>) -> BoxFuture<'static, Outcome>;
}

// Typed operation closure plus the types it was registered with.
struct Handler<F, Fut, TArgs, TResp, E> {
    func: F,
    _phantom: PhantomData<fn(TArgs) -> (Fut, TResp, E)>,
}

impl<F, Fut, TArgs, TResp, E> HandlerFn for Handler<F, Fut, TArgs, TResp, E>
where
    F: Fn(TArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<TResp, E>> + Send + 'static,
    TArgs: DeserializeOwned + Send + 'static,
    TResp: Serialize + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    fn call(&self, method: &str, args: Vec<Value>) -> BoxFuture<'static, Outcome> {
        // ---
        let args: TArgs = match decode_args(args) {
            Ok(args) => args,
            Err(err) => {
                let text = format!("Invalid arguments for \"{method}\": {err}");
                return Box::pin(async move { Err(text) });
            }
        };

        let fut = (self.func)(args);
        let method = method.to_string();

        Box::pin(async move {
            // Display only: the message text, never debug or backtrace detail.
            let resp = fut.await.map_err(|err| err.to_string())?;

            serde_json::to_value(resp)
                .map_err(|err| format!("Result of \"{method}\" could not be encoded: {err}"))
        })
    }
}

/// Positional arguments: a tuple (or `Vec`) parameter takes the array as is;
/// a `()` parameter accepts an empty array. When neither reading fits, the
/// array error is the one reported.
fn decode_args<T: DeserializeOwned>(args: Vec<Value>) -> serde_json::Result<T> {
    // ---
    let empty = args.is_empty();

    match serde_json::from_value(Value::Array(args)) {
        Ok(decoded) => Ok(decoded),
        Err(err) if empty => serde_json::from_value(Value::Null).map_err(|_| err),
        Err(err) => Err(err),
    }
}

#[derive(Clone)]
enum Entry {
    Method(Arc<dyn HandlerFn>),
    Property(Value),
}

/// Closed table of operations an embedded context exposes.
///
/// Only names registered through [`method`](Self::method) or
/// [`property`](Self::property) exist; there is no inherited or built-in
/// surface, so names such as `constructor`, `toString` or `__proto__` are
/// simply absent unless registered explicitly.
///
/// Operations take their arguments as one tuple, matching the positional
/// `args` array on the wire:
///
/// ```
/// use frame_rpc::MethodTable;
/// use std::convert::Infallible;
///
/// let methods = MethodTable::new()
///     .method("add", |(a, b): (i64, i64)| async move { Ok::<_, Infallible>(a + b) })
///     .method("greet", |(name,): (String,)| async move {
///         Ok::<_, Infallible>(format!("Hello, {name}!"))
///     })
///     .property("version", "1.2.0");
///
/// assert_eq!(methods.len(), 3);
/// ```
#[derive(Clone, Default)]
pub struct MethodTable {
    // ---
    entries: HashMap<String, Entry>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an async operation under `name`, replacing any previous
    /// entry.
    ///
    /// The closure receives the decoded argument tuple. An `Err` is sent to
    /// the caller as its `Display` text only.
    pub fn method<F, Fut, TArgs, TResp, E>(mut self, name: impl Into<String>, func: F) -> Self
    where
        F: Fn(TArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<TResp, E>> + Send + 'static,
        TArgs: DeserializeOwned + Send + 'static,
        TResp: Serialize + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        // ---
        let handler = Handler {
            func,
            _phantom: PhantomData,
        };
        self.entries
            .insert(name.into(), Entry::Method(Arc::new(handler)));
        self
    }

    /// Register a plain value. It exists in the table but cannot be called;
    /// requests naming it are answered with a "not a function" error.
    pub fn property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries
            .insert(name.into(), Entry::Property(value.into()));
        self
    }

    /// Value registered with [`property`](Self::property), if `name` is one.
    pub fn property_value(&self, name: &str) -> Option<&Value> {
        match self.entries.get(name)? {
            Entry::Property(value) => Some(value),
            Entry::Method(_) => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the invocable entry for `method`, or the error text to send back.
    pub(super) fn resolve(&self, method: &str) -> std::result::Result<Arc<dyn HandlerFn>, String> {
        // ---
        match self.entries.get(method) {
            None => Err(format!("Method \"{method}\" is not exposed.")),
            Some(Entry::Property(_)) => Err(format!("\"{method}\" is not a function.")),
            Some(Entry::Method(handler)) => Ok(handler.clone()),
        }
    }
}

impl fmt::Debug for MethodTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodTable")
            .field("names", &self.names())
            .finish()
    }
}
