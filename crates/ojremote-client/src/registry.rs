//! Type and capability registries.
//!
//! [`TypeRegistry`] maps Rust type identities to the server's wire type names
//! and back, one-to-one. [`CapabilityRegistry`] layers handler factories on
//! top: a capability the server advertises is only bound on a proxy when this
//! registry knows its wire name.
//!
//! Both are plain values owned by whoever builds the session. There is no
//! process-wide registry.

use std::any::{TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use ojremote_types::{
    ImageData, Implementation, NotificationMessage, ServerInfo, StateData, StructuralData,
    TransportableRef, names,
};

use crate::capability::{Binding, Capability};
use crate::error::{RemoteError, Result};
use crate::toolkit::ClientToolkit;

// ============================================================================
// TypeDescriptor
// ============================================================================

/// A wire-level type tag.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TypeDescriptor {
    name: Arc<str>,
}

impl TypeDescriptor {
    fn new(name: &str) -> Self {
        Self { name: Arc::from(name) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Descriptor for an array of this type.
    ///
    /// Names follow the server's descriptor encoding: `[I` for `int[]`,
    /// `[Ljava.lang.String;` for `String[]`, and one extra `[` per level.
    pub fn array_of(&self) -> TypeDescriptor {
        TypeDescriptor::new(&array_name(&self.name))
    }

    pub fn is_array(&self) -> bool {
        self.name.starts_with('[')
    }

    /// Element descriptor of an array type.
    pub fn element(&self) -> Option<TypeDescriptor> {
        element_name(&self.name).map(|n| TypeDescriptor::new(&n))
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeDescriptor({})", self.name)
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

fn primitive_code(name: &str) -> Option<char> {
    Some(match name {
        "boolean" => 'Z',
        "byte" => 'B',
        "char" => 'C',
        "short" => 'S',
        "int" => 'I',
        "long" => 'J',
        "float" => 'F',
        "double" => 'D',
        _ => return None,
    })
}

fn primitive_name(code: &str) -> Option<&'static str> {
    Some(match code {
        "Z" => "boolean",
        "B" => "byte",
        "C" => "char",
        "S" => "short",
        "I" => "int",
        "J" => "long",
        "F" => "float",
        "D" => "double",
        _ => return None,
    })
}

fn array_name(element: &str) -> String {
    if element.starts_with('[') {
        format!("[{element}")
    } else if let Some(code) = primitive_code(element) {
        format!("[{code}")
    } else {
        format!("[L{element};")
    }
}

fn element_name(name: &str) -> Option<String> {
    let rest = name.strip_prefix('[')?;
    if rest.starts_with('[') {
        return Some(rest.to_string());
    }
    if let Some(class) = rest.strip_prefix('L').and_then(|r| r.strip_suffix(';')) {
        return Some(class.to_string());
    }
    primitive_name(rest).map(str::to_string)
}

// ============================================================================
// TypeRegistry
// ============================================================================

/// One-to-one mapping between Rust type identity and wire type name.
#[derive(Default)]
pub struct TypeRegistry {
    by_type: HashMap<TypeId, TypeDescriptor>,
    by_name: HashMap<String, TypeId>,
}

impl TypeRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the platform and payload types every session needs.
    pub fn with_platform_types() -> Result<Self> {
        let mut types = Self::new();
        types.register::<()>(names::VOID)?;
        types.register::<bool>(names::BOOLEAN)?;
        types.register::<i32>(names::INT)?;
        types.register::<i64>(names::LONG)?;
        types.register::<String>(names::STRING)?;
        types.register::<TransportableRef>(names::TRANSPORTABLE)?;
        types.register::<ServerInfo>(names::SERVER_INFO)?;
        types.register::<ImageData>(names::IMAGE_DATA)?;
        types.register::<StructuralData>(names::STRUCTURAL_DATA)?;
        types.register::<StateData>(names::STATE_DATA)?;
        types.register::<NotificationMessage>(names::NOTIFICATION)?;
        Ok(types)
    }

    /// Bind `T` to `name`. Fails if either side is already bound.
    pub fn register<T: 'static>(&mut self, name: &str) -> Result<TypeDescriptor> {
        let key = TypeId::of::<T>();
        if let Some(existing) = self.by_type.get(&key) {
            return Err(RemoteError::DuplicateRegistration {
                name: format!("{} (as {})", type_name::<T>(), existing.name()),
            });
        }
        if self.by_name.contains_key(name) {
            return Err(RemoteError::DuplicateRegistration { name: name.to_string() });
        }
        let descriptor = TypeDescriptor::new(name);
        self.by_type.insert(key, descriptor.clone());
        self.by_name.insert(name.to_string(), key);
        Ok(descriptor)
    }

    pub fn for_type<T: 'static>(&self) -> Result<TypeDescriptor> {
        self.by_type
            .get(&TypeId::of::<T>())
            .cloned()
            .ok_or_else(|| RemoteError::NotRegistered(type_name::<T>().to_string()))
    }

    /// Look up by wire name. Array names resolve when their element does.
    pub fn for_name(&self, name: &str) -> Result<TypeDescriptor> {
        if let Some(key) = self.by_name.get(name) {
            if let Some(descriptor) = self.by_type.get(key) {
                return Ok(descriptor.clone());
            }
        }
        match element_name(name) {
            Some(element) => self.for_name(&element).map(|d| d.array_of()),
            None => Err(RemoteError::NotRegistered(name.to_string())),
        }
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.for_name(name).is_ok()
    }

    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}

// ============================================================================
// CapabilityRegistry
// ============================================================================

/// What a handler factory gets to build one handler.
pub struct HandlerContext<'a> {
    pub toolkit: &'a ClientToolkit,
    pub types: &'a TypeRegistry,
    pub implementation: &'a Implementation,
}

/// Builds the handler for one advertised capability.
pub type HandlerFactory = Arc<dyn Fn(&HandlerContext<'_>) -> Result<Binding> + Send + Sync>;

/// Capabilities this client can represent, keyed by wire name.
pub struct CapabilityRegistry {
    types: TypeRegistry,
    factories: HashMap<String, HandlerFactory>,
}

impl CapabilityRegistry {
    /// Platform types only, no capabilities.
    pub fn new() -> Result<Self> {
        Ok(Self { types: TypeRegistry::with_platform_types()?, factories: HashMap::new() })
    }

    /// Every built-in capability under its standard wire name.
    pub fn with_defaults() -> Result<Self> {
        let mut registry = Self::new()?;
        crate::handlers::register_defaults(&mut registry)?;
        Ok(registry)
    }

    /// Register capability `C` under `name` with the factory that builds its handler.
    pub fn register<C: Capability>(
        &mut self,
        name: &str,
        factory: HandlerFactory,
    ) -> Result<TypeDescriptor> {
        let descriptor = self.types.register::<C>(name)?;
        self.factories.insert(name.to_string(), factory);
        Ok(descriptor)
    }

    /// Whether a server-advertised capability name can be bound.
    pub fn is_known(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn factory(&self, name: &str) -> Option<&HandlerFactory> {
        self.factories.get(name)
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn types_mut(&mut self) -> &mut TypeRegistry {
        &mut self.types
    }
}

// ============================================================================
// Tests
// ============================================================================
