//! Builtin function table.

pub mod array;
pub mod logical;
pub mod math;
pub mod text;

use crate::traits::Function;
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use std::sync::Arc;

static REGISTRY: Lazy<FxHashMap<&'static str, Arc<dyn Function>>> = Lazy::new(|| {
    let mut map: FxHashMap<&'static str, Arc<dyn Function>> = FxHashMap::default();
    for f in math::register()
        .into_iter()
        .chain(logical::register())
        .chain(text::register())
        .chain(array::register())
    {
        map.insert(f.name(), f);
    }
    map
});

/// Look a function up by name, ignoring case.
pub fn get(name: &str) -> Option<Arc<dyn Function>> {
    REGISTRY.get(name.to_ascii_uppercase().as_str()).cloned()
}

pub fn names() -> impl Iterator<Item = &'static str> {
    REGISTRY.keys().copied()
}
