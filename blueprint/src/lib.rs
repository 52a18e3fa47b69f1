//! Layered, polymorphic object construction.
//!
//! A [`Blueprint`] binds a construction target to an ordered stack of
//! argument layers and produces either a fully-constructed [`Value`] or a
//! precise diagnostic. Arguments address nested parameters by dotted paths
//! (`model.layers.count`), wildcard keys containing `...` match runs of
//! path segments, and a parameter of type `T` can be satisfied by any
//! registered factory producing a subtype of `T`, selected by name from
//! the same argument map that configures it.
//!
//! Everything resolves against an explicit [`Registry`] of classes, free
//! functions and typed-dict schemas; there is no runtime reflection.

mod argmap;
mod argv;
mod blueprint;
mod cast;
mod errors;
mod factories;
mod lazy;
mod params;
mod registry;
mod tests;
mod ty;
mod value;
mod wildcard;

pub use argmap::{Arg, ArgumentMap, FoundArg, Layer};
pub use argv::argv_to_args;
pub use blueprint::Blueprint;
pub use cast::cast;
pub use errors::{BlueprintError, CastError, MetaFromString};
pub use factories::{
    FunctionFactory, MetaFactory, Standard, Subclass, TypeSubclass, UnionFactory,
};
pub use lazy::{Evaluatable, Thunk, ValueMap, check_reference_targets, evaluate};
pub use params::Param;
pub use registry::{
    Build, BuildFn, CastFn, ClassDef, DictDef, DictKey, Factory, FieldDef, FunctionDef, Kwargs,
    MetaSpec, ParamDefault, ParamKind, ParamSpec, Registry, SigParam, TargetDef, TypeParam,
};
pub use ty::{Ty, ty_is_subtype};
pub use value::{Instance, Value, value_satisfies};
pub use wildcard::{wildcard_key_approx, wildcard_key_to_regex, wildcard_match};
