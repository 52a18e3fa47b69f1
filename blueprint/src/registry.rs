//! The registered world the engine resolves names against.
//!
//! There is no runtime reflection to lean on: every class, free function and
//! typed-dict schema a blueprint may construct is registered up front. A
//! [`Registry`] owns the descriptors, the nominal subtype lattice, and
//! qualified `module:Name` lookup; [`Factory`] is the callable handed to the
//! construction walk and stored in thunks.

use crate::errors::CastError;
use crate::factories::MetaFactory;
use crate::ty::Ty;
use crate::value::{Instance, Value};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Named arguments passed to a factory at evaluation time.
pub type Kwargs = IndexMap<String, Value>;

/// Construction closure for a registered free function.
#[derive(Clone)]
pub struct BuildFn(pub Arc<dyn Fn(&Kwargs) -> Result<Value, String> + Send + Sync>);

impl BuildFn {
    pub fn new(f: impl Fn(&Kwargs) -> Result<Value, String> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }
}

impl fmt::Debug for BuildFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BuildFn(..)")
    }
}

/// Field-level cast override.
#[derive(Clone)]
pub struct CastFn(pub Arc<dyn Fn(&str) -> Result<Value, CastError> + Send + Sync>);

impl CastFn {
    pub fn new(f: impl Fn(&str) -> Result<Value, CastError> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }
}

impl fmt::Debug for CastFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CastFn(..)")
    }
}

/// A parameter default: a literal value, a zero-argument factory, or the
/// not-required sentinel used for optional typed-dict keys.
#[derive(Debug, Clone)]
pub enum ParamDefault {
    Value(Value),
    Factory(Factory),
    NotRequired,
}

impl ParamDefault {
    /// Compact rendering for the help table.
    pub fn to_help_str(&self) -> String {
        match self {
            ParamDefault::Factory(f) => format!("{}()", f.qualified_name()),
            ParamDefault::Value(v) => {
                let rendered = v.repr();
                if rendered.len() > 40 {
                    "<default>".to_string()
                } else {
                    rendered
                }
            }
            ParamDefault::NotRequired => "NotRequired".to_string(),
        }
    }
}

/// How a field picks its meta-factory.
#[derive(Debug, Clone, Default)]
pub enum MetaSpec {
    /// Derive a standard meta-factory from the field's annotation.
    #[default]
    Auto,
    /// No polymorphic construction for this field.
    Disabled,
    Custom(Arc<dyn MetaFactory>),
}

/// One field of a registered class schema.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub ty: Ty,
    pub default: Option<ParamDefault>,
    pub doc: String,
    pub meta: MetaSpec,
    pub cast: Option<CastFn>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, ty: Ty) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
            doc: String::new(),
            meta: MetaSpec::Auto,
            cast: None,
        }
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(ParamDefault::Value(value.into()));
        self
    }

    pub fn default_factory(mut self, factory: Factory) -> Self {
        self.default = Some(ParamDefault::Factory(factory));
        self
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    pub fn meta_factory(mut self, meta: Arc<dyn MetaFactory>) -> Self {
        self.meta = MetaSpec::Custom(meta);
        self
    }

    pub fn no_polymorphism(mut self) -> Self {
        self.meta = MetaSpec::Disabled;
        self
    }

    pub fn cast(mut self, cast: CastFn) -> Self {
        self.cast = Some(cast);
        self
    }
}

/// Kind of a reflected signature parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    PositionalOnly,
    Positional,
    KeywordOnly,
    VarPositional,
    VarKeyword,
}

/// One parameter of a registered free function's signature.
#[derive(Debug, Clone)]
pub struct SigParam {
    pub name: String,
    /// `None` means unannotated; the collector substitutes the owning class
    /// for an unannotated first parameter of a method-style target, and
    /// `Any` otherwise.
    pub ty: Option<Ty>,
    pub kind: ParamKind,
    pub default: Option<Value>,
}

impl SigParam {
    pub fn new(name: impl Into<String>, ty: Ty) -> Self {
        Self {
            name: name.into(),
            ty: Some(ty),
            kind: ParamKind::Positional,
            default: None,
        }
    }

    pub fn unannotated(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: None,
            kind: ParamKind::Positional,
            default: None,
        }
    }

    pub fn kind(mut self, kind: ParamKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// How a target's parameters are discovered.
#[derive(Debug, Clone)]
pub enum ParamSpec {
    /// A declared field schema (a registered class).
    Fields(Vec<FieldDef>),
    /// A reflected callable signature (a registered free function).
    Signature(Vec<SigParam>),
}

/// How a target builds its value from evaluated kwargs.
#[derive(Debug, Clone)]
pub enum Build {
    /// Build an [`Instance`] from the field schema, filling defaults.
    Instance,
    Custom(BuildFn),
}

/// A generic type parameter declared by a class.
#[derive(Debug, Clone)]
pub struct TypeParam {
    pub name: String,
    /// Bare-name generic arguments resolve by subclass search under this
    /// bound; without a bound they must name a registered class directly.
    pub bound: Option<Ty>,
}

/// A registered construction target: a class constructor or a free function.
#[derive(Debug, Clone)]
pub struct TargetDef {
    pub module: String,
    pub name: String,
    pub doc: String,
    /// The type a call produces.
    pub output: Ty,
    /// Direct base classes (classes only).
    pub bases: Vec<String>,
    pub type_params: Vec<TypeParam>,
    pub params: ParamSpec,
    pub build: Build,
    /// Owning class of a method-style function; used to type an unannotated
    /// first parameter.
    pub owner: Option<String>,
}

impl TargetDef {
    pub fn qualified_name(&self) -> String {
        if self.module.is_empty() {
            self.name.clone()
        } else {
            format!("{}:{}", self.module, self.name)
        }
    }

    pub fn is_field_schema(&self) -> bool {
        matches!(self.params, ParamSpec::Fields(_))
    }
}

/// A callable the engine can defer into a thunk.
///
/// Polymorphic construction is a sum over these shapes rather than dynamic
/// dispatch: a registered target, a synthesized container constructor, or
/// one of the two zero-argument forms.
#[derive(Debug, Clone)]
pub enum Factory {
    Target(Arc<TargetDef>),
    /// Container constructor synthesized from observed sub-paths.
    Container(Ty),
    /// Zero-argument factory yielding the class object itself.
    TypeValue(String),
    /// Zero-argument factory yielding `Null`.
    NullValue,
}

impl PartialEq for Factory {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Factory::Target(a), Factory::Target(b)) => {
                Arc::ptr_eq(a, b) || (a.module == b.module && a.name == b.name)
            }
            (Factory::Container(a), Factory::Container(b)) => a == b,
            (Factory::TypeValue(a), Factory::TypeValue(b)) => a == b,
            (Factory::NullValue, Factory::NullValue) => true,
            _ => false,
        }
    }
}

impl Factory {
    /// The static type a call to this factory produces.
    pub fn output(&self) -> Ty {
        match self {
            Factory::Target(def) => def.output.clone(),
            Factory::Container(ty) => ty.clone(),
            Factory::TypeValue(class) => Ty::type_of(Ty::Class(class.clone())),
            Factory::NullValue => Ty::Null,
        }
    }

    /// Display name used in help output and diagnostics.
    pub fn qualified_name(&self) -> String {
        match self {
            Factory::Target(def) => def.qualified_name(),
            Factory::Container(ty) => ty.to_string(),
            Factory::TypeValue(class) => format!("type[{class}]"),
            Factory::NullValue => "None".to_string(),
        }
    }

    /// Invoke the factory with evaluated kwargs.
    pub fn call(&self, kwargs: &Kwargs, registry: &Registry) -> Result<Value, String> {
        match self {
            Factory::Target(def) => match &def.build {
                Build::Custom(build) => (build.0)(kwargs),
                Build::Instance => build_instance(def, kwargs, registry),
            },
            Factory::Container(ty) => build_container(ty, kwargs, registry),
            Factory::TypeValue(class) => Ok(Value::Type(class.clone())),
            Factory::NullValue => Ok(Value::Null),
        }
    }
}

fn build_instance(def: &TargetDef, kwargs: &Kwargs, registry: &Registry) -> Result<Value, String> {
    let ParamSpec::Fields(fields) = &def.params else {
        return Err(format!(
            "{} is not a field-schema target; register a build function",
            def.qualified_name()
        ));
    };
    let mut out = IndexMap::new();
    for field in fields {
        if let Some(value) = kwargs.get(&field.name) {
            out.insert(field.name.clone(), value.clone());
            continue;
        }
        match &field.default {
            Some(ParamDefault::Value(v)) => {
                out.insert(field.name.clone(), v.clone());
            }
            Some(ParamDefault::Factory(factory)) => {
                let v = factory.call(&Kwargs::new(), registry)?;
                out.insert(field.name.clone(), v);
            }
            Some(ParamDefault::NotRequired) => {}
            None => {
                return Err(format!(
                    "missing required field {:?} for {}",
                    field.name,
                    def.qualified_name()
                ));
            }
        }
    }
    Ok(Value::Instance(Instance {
        class: def.name.clone(),
        fields: out,
    }))
}

fn build_container(ty: &Ty, kwargs: &Kwargs, registry: &Registry) -> Result<Value, String> {
    fn indexed(ty: &Ty, kwargs: &Kwargs) -> Result<Vec<Value>, String> {
        let mut items = Vec::with_capacity(kwargs.len());
        for i in 0..kwargs.len() {
            let key = i.to_string();
            let Some(v) = kwargs.get(&key) else {
                return Err(format!("missing index {i} while constructing {ty}"));
            };
            items.push(v.clone());
        }
        Ok(items)
    }

    match ty {
        Ty::List(_) => Ok(Value::List(indexed(ty, kwargs)?)),
        Ty::Seq(_) | Ty::Tuple(_) | Ty::TupleOf(_) => Ok(Value::Tuple(indexed(ty, kwargs)?)),
        Ty::Dict(..) => Ok(Value::Dict(kwargs.clone())),
        Ty::TypedDict(name) => {
            let Some(schema) = registry.typed_dict(name) else {
                return Err(format!("unknown typed dict {name:?}"));
            };
            for key in &schema.keys {
                if key.required && !kwargs.contains_key(&key.name) {
                    return Err(format!("missing required key {:?} for {name}", key.name));
                }
            }
            Ok(Value::Dict(kwargs.clone()))
        }
        _ => Err(format!("{ty} is not a variadic container type")),
    }
}

/// One key of a typed-dict schema.
#[derive(Debug, Clone)]
pub struct DictKey {
    pub name: String,
    pub ty: Ty,
    pub required: bool,
}

/// A registered typed-dict schema.
#[derive(Debug, Clone)]
pub struct DictDef {
    pub name: String,
    pub keys: Vec<DictKey>,
}

impl DictDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keys: Vec::new(),
        }
    }

    pub fn key(mut self, name: impl Into<String>, ty: Ty) -> Self {
        self.keys.push(DictKey {
            name: name.into(),
            ty,
            required: true,
        });
        self
    }

    pub fn optional_key(mut self, name: impl Into<String>, ty: Ty) -> Self {
        self.keys.push(DictKey {
            name: name.into(),
            ty,
            required: false,
        });
        self
    }
}

/// Builder for a registered class.
#[derive(Debug, Clone)]
pub struct ClassDef {
    module: String,
    name: String,
    doc: String,
    bases: Vec<String>,
    type_params: Vec<TypeParam>,
    fields: Vec<FieldDef>,
}

impl ClassDef {
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
            doc: String::new(),
            bases: Vec::new(),
            type_params: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    pub fn base(mut self, base: impl Into<String>) -> Self {
        self.bases.push(base.into());
        self
    }

    pub fn type_param(mut self, name: impl Into<String>, bound: Option<Ty>) -> Self {
        self.type_params.push(TypeParam {
            name: name.into(),
            bound,
        });
        self
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }
}

/// Builder for a registered free function.
pub struct FunctionDef {
    module: String,
    name: String,
    doc: String,
    ret: Ty,
    params: Vec<SigParam>,
    owner: Option<String>,
    build: BuildFn,
}

impl FunctionDef {
    pub fn new(
        module: impl Into<String>,
        name: impl Into<String>,
        ret: Ty,
        build: impl Fn(&Kwargs) -> Result<Value, String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
            doc: String::new(),
            ret,
            params: Vec::new(),
            owner: None,
            build: BuildFn::new(build),
        }
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    pub fn param(mut self, param: SigParam) -> Self {
        self.params.push(param);
        self
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }
}

/// The world of registered targets and schemas.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    targets: Vec<Arc<TargetDef>>,
    by_qualified: HashMap<(String, String), usize>,
    class_by_name: HashMap<String, usize>,
    subclasses: HashMap<String, Vec<String>>,
    dicts: IndexMap<String, DictDef>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class.
    ///
    /// # Panics
    /// Panics if the class name is already registered (the nominal subtype
    /// lattice refers to classes by name) or if a base is unknown.
    pub fn add_class(&mut self, class: ClassDef) -> Arc<TargetDef> {
        if self.class_by_name.contains_key(&class.name) {
            panic!("class {:?} is already registered", class.name);
        }
        for base in &class.bases {
            if !self.class_by_name.contains_key(base) {
                panic!(
                    "base class {:?} of {:?} is not registered",
                    base, class.name
                );
            }
        }
        let def = Arc::new(TargetDef {
            module: class.module,
            name: class.name.clone(),
            doc: class.doc,
            output: Ty::Class(class.name.clone()),
            bases: class.bases.clone(),
            type_params: class.type_params,
            params: ParamSpec::Fields(class.fields),
            build: Build::Instance,
            owner: None,
        });
        let idx = self.insert(def.clone());
        self.class_by_name.insert(class.name.clone(), idx);
        for base in &class.bases {
            self.subclasses
                .entry(base.clone())
                .or_default()
                .push(class.name.clone());
        }
        def
    }

    /// Register a free function.
    pub fn add_function(&mut self, function: FunctionDef) -> Arc<TargetDef> {
        let def = Arc::new(TargetDef {
            module: function.module,
            name: function.name,
            doc: function.doc,
            output: function.ret,
            bases: Vec::new(),
            type_params: Vec::new(),
            params: ParamSpec::Signature(function.params),
            build: Build::Custom(function.build),
            owner: function.owner,
        });
        self.insert(def.clone());
        def
    }

    pub fn add_typed_dict(&mut self, dict: DictDef) {
        self.dicts.insert(dict.name.clone(), dict);
    }

    fn insert(&mut self, def: Arc<TargetDef>) -> usize {
        let idx = self.targets.len();
        self.by_qualified
            .insert((def.module.clone(), def.name.clone()), idx);
        self.targets.push(def);
        idx
    }

    pub fn lookup_qualified(&self, module: &str, name: &str) -> Option<Arc<TargetDef>> {
        self.by_qualified
            .get(&(module.to_string(), name.to_string()))
            .map(|&idx| self.targets[idx].clone())
    }

    pub fn has_module(&self, module: &str) -> bool {
        self.targets.iter().any(|t| t.module == module)
    }

    /// The constructor target of a registered class.
    pub fn class_def(&self, name: &str) -> Option<Arc<TargetDef>> {
        self.class_by_name.get(name).map(|&idx| self.targets[idx].clone())
    }

    pub fn typed_dict(&self, name: &str) -> Option<&DictDef> {
        self.dicts.get(name)
    }

    /// Whether `sub` is `sup` or transitively derives from it.
    pub fn class_is_subclass(&self, sub: &str, sup: &str) -> bool {
        if sub == sup {
            return true;
        }
        let Some(&idx) = self.class_by_name.get(sub) else {
            return false;
        };
        self.targets[idx]
            .bases
            .iter()
            .any(|base| self.class_is_subclass(base, sup))
    }

    /// Breadth-first search of the subtype lattice rooted at `base`
    /// (including `base` itself) for a class named `name`.
    pub fn find_subclass_named(&self, base: &str, name: &str) -> Option<Arc<TargetDef>> {
        let mut queue = std::collections::VecDeque::from([base.to_string()]);
        let mut visited = std::collections::HashSet::new();
        while let Some(class) = queue.pop_front() {
            if !visited.insert(class.clone()) {
                continue;
            }
            if class == name {
                return self.class_def(&class);
            }
            if let Some(children) = self.subclasses.get(&class) {
                queue.extend(children.iter().cloned());
            }
        }
        None
    }

    /// Resolve a target by bare or `module:Name` reference.
    ///
    /// Bare names resolve to the unique registered target with that name.
    pub fn resolve(&self, reference: &str) -> Option<Arc<TargetDef>> {
        if let Some((module, name)) = reference.split_once(':') {
            return self.lookup_qualified(module, name);
        }
        let mut matches = self.targets.iter().filter(|t| t.name == reference);
        let first = matches.next()?;
        if matches.next().is_some() {
            return None;
        }
        Some(first.clone())
    }
}
