//! Resolution of typed parameter bundles from an [`InvocationContext`].
//!
//! A bundle starts from its `Default` value, then every binding whose key is
//! present in the context overlays its field:
//!
//! - data entries are merged onto the field's current value, so keys missing
//!   from the context entry keep their defaults and a generic map converts
//!   into a nested struct;
//! - service entries are downcast to the field's exact type.
//!
//! Any failed conversion aborts resolution with a [`DecodeError`].
//!
//! ```rust
//! use devtools_engine::context::InvocationContext;
//! use devtools_engine::resolve::{Binding, ParameterBundle, resolve};
//! use serde::{Deserialize, Serialize};
//! use serde_json::json;
//!
//! #[derive(Debug, Default, Serialize, Deserialize)]
//! #[serde(default)]
//! struct Theme {
//!     name: String,
//!     dark: bool,
//! }
//!
//! #[derive(Debug, Default)]
//! struct Params {
//!     theme: Theme,
//! }
//!
//! impl ParameterBundle for Params {
//!     fn bindings() -> Vec<Binding<Self>> {
//!         vec![Binding::data("cfg", |p: &mut Params| &mut p.theme)]
//!     }
//! }
//!
//! let mut ctx = InvocationContext::default();
//! ctx.insert_value("cfg", json!({"dark": true}));
//! let params: Params = resolve(&ctx).unwrap();
//! assert!(params.theme.dark);
//! ```

use std::any::type_name;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::context::{ContextValue, InvocationContext};
use crate::error::DecodeError;

type Apply<B> = Box<dyn Fn(&mut B, &ContextValue) -> Result<(), DecodeError> + Send + Sync>;

/// Maps one context key onto one field of a bundle.
pub struct Binding<B> {
    key: &'static str,
    apply: Apply<B>,
}

impl<B: 'static> Binding<B> {
    /// Binds a serializable field. The context entry must be data.
    pub fn data<T>(key: &'static str, field: fn(&mut B) -> &mut T) -> Self
    where
        T: Serialize + DeserializeOwned + 'static,
    {
        let apply = move |bundle: &mut B, value: &ContextValue| {
            let expected = type_name::<T>();
            let ContextValue::Data(overlay) = value else {
                return Err(DecodeError::new(key, expected, "found a service entry, expected data"));
            };
            let slot = field(bundle);
            let mut merged = serde_json::to_value(&*slot).map_err(|error| DecodeError::new(key, expected, error))?;
            merge_json(&mut merged, overlay);
            *slot = serde_json::from_value(merged).map_err(|error| DecodeError::new(key, expected, error))?;
            Ok(())
        };
        Self {
            key,
            apply: Box::new(apply),
        }
    }

    /// Binds a shared service. The context entry must hold exactly a `T`.
    pub fn service<T>(key: &'static str, field: fn(&mut B) -> &mut Option<T>) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        let apply = move |bundle: &mut B, value: &ContextValue| {
            let expected = type_name::<T>();
            let ContextValue::Service(service) = value else {
                return Err(DecodeError::new(key, expected, "found a data entry, expected a service"));
            };
            let service = service
                .downcast_ref::<T>()
                .ok_or_else(|| DecodeError::new(key, expected, "service has a different type"))?;
            *field(bundle) = Some(service.clone());
            Ok(())
        };
        Self {
            key,
            apply: Box::new(apply),
        }
    }

    pub fn key(&self) -> &'static str {
        self.key
    }
}

/// A typed group of parameters a manager reads from the context.
pub trait ParameterBundle: Default + Sized + 'static {
    fn bindings() -> Vec<Binding<Self>>;
}

/// Builds `B` from its defaults and the entries present in `ctx`.
pub fn resolve<B: ParameterBundle>(ctx: &InvocationContext) -> Result<B, DecodeError> {
    let mut bundle = B::default();
    for binding in B::bindings() {
        if let Some(value) = ctx.get(binding.key) {
            (binding.apply)(&mut bundle, value)?;
        }
    }
    Ok(bundle)
}

/// Deep-merges `overlay` onto `base`. Objects merge key by key; any other
/// overlay value replaces the base value, except `null`, which leaves it as is.
fn merge_json(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (_, Value::Null) => {}
        (base, overlay) => *base = overlay.clone(),
    }
}
