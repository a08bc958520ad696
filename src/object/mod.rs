//! Class, vtable and instance registries.
//!
//! Classes use single inheritance. A class's merged vtable is its parent's
//! merged vtable overlaid with its own methods, so a child method with the
//! same name as a parent method replaces it. Vtables and instances live on
//! the heap collaborator:
//!
//! | Allocation | Size | Alignment | Type info |
//! |------------|------|-----------|-----------|
//! | vtable | 4 × methods | 4 | `Vtable { class }` |
//! | instance | 4 + Σ field sizes | 4 | `Instance { class }` |
//!
//! The first cell of an instance holds its vtable address. Nothing is ever
//! removed from the registries.
//!
//! # Example
//!
//! ```
//! use neural_vm::memory::SimulatedHeap;
//! use neural_vm::object::{ClassDef, MethodDef, ObjectSystem};
//!
//! let mut heap = SimulatedHeap::default();
//! let mut objects = ObjectSystem::new();
//! objects
//!     .define_class(&mut heap, "Shape", ClassDef::new().method(MethodDef::new("area", 0x100)))
//!     .unwrap();
//! let id = objects.create_instance(&mut heap, "Shape").unwrap().id;
//! assert_eq!(objects.resolve_method(id, "area"), Some(0x100));
//! ```

pub mod catalog;

pub use catalog::{class_name, parse_class_id, struct_name, ClassSchema, SchemaCatalog};

use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

use crate::interpreter::traits::{FieldDef, Heap, TypeInfo};

/// Bytes reserved at the start of an instance for the vtable pointer.
pub const VTABLE_POINTER_SIZE: u32 = 4;

/// Errors from class registration and instantiation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ObjectError {
    #[error("class '{0}' is already defined")]
    DuplicateClass(String),

    #[error("unknown class '{0}'")]
    UnknownClass(String),

    #[error("parent class '{0}' is not defined")]
    UnknownParent(String),

    #[error("'{child}' cannot inherit from '{parent}': would create a cycle")]
    InheritanceCycle { child: String, parent: String },

    #[error("heap could not allocate {size} bytes for '{class}'")]
    AllocationFailed { class: String, size: u32 },
}

/// A method entry: name and code address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDef {
    pub name: String,
    pub address: u32,
}

impl MethodDef {
    pub fn new(name: impl Into<String>, address: u32) -> Self {
        Self {
            name: name.into(),
            address,
        }
    }
}

/// Class declaration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClassDef {
    pub fields: Vec<FieldDef>,
    pub methods: Vec<MethodDef>,
    pub parent: Option<String>,
}

impl ClassDef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: &str, type_name: &str) -> Self {
        self.fields.push(FieldDef::new(name, type_name));
        self
    }

    pub fn method(mut self, method: MethodDef) -> Self {
        self.methods.push(method);
        self
    }

    pub fn parent(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }
}

/// Merged method table of a class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vtable {
    /// Heap address (0 if the class has no methods).
    pub address: u32,
    pub methods: BTreeMap<String, u32>,
}

/// A live object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub id: usize,
    pub class: String,
    pub address: u32,
    pub size: u32,
    pub vtable: u32,
}

/// Registries of classes, vtables and instances.
#[derive(Debug, Clone, Default)]
pub struct ObjectSystem {
    classes: HashMap<String, ClassDef>,
    vtables: HashMap<String, Vtable>,
    instances: Vec<Instance>,
}

impl ObjectSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class and allocate its merged vtable.
    pub fn define_class<H: Heap + ?Sized>(
        &mut self,
        heap: &mut H,
        name: &str,
        def: ClassDef,
    ) -> Result<&Vtable, ObjectError> {
        if self.classes.contains_key(name) {
            return Err(ObjectError::DuplicateClass(name.to_string()));
        }

        let methods = self.merged_methods(&def)?;
        let address = heap.allocate(
            methods.len() as u32 * 4,
            4,
            Some(TypeInfo::Vtable { class: name.to_string() }),
        );

        log::debug!(
            "class {} defined (parent {:?}, {} methods, vtable 0x{:08X})",
            name,
            def.parent,
            methods.len(),
            address
        );

        self.classes.insert(name.to_string(), def);
        let vtable = self
            .vtables
            .entry(name.to_string())
            .or_insert(Vtable { address, methods });
        Ok(vtable)
    }

    /// Re-parent an existing class and rebuild its merged vtable.
    ///
    /// The vtable keeps its address; a class that had no methods before
    /// gets one allocated.
    pub fn inherit<H: Heap + ?Sized>(
        &mut self,
        heap: &mut H,
        child: &str,
        parent: &str,
    ) -> Result<(), ObjectError> {
        if !self.classes.contains_key(child) {
            return Err(ObjectError::UnknownClass(child.to_string()));
        }
        if !self.classes.contains_key(parent) {
            return Err(ObjectError::UnknownParent(parent.to_string()));
        }
        if self.ancestry(parent).any(|ancestor| ancestor == child) {
            return Err(ObjectError::InheritanceCycle {
                child: child.to_string(),
                parent: parent.to_string(),
            });
        }

        let mut def = self.classes[child].clone();
        def.parent = Some(parent.to_string());
        let methods = self.merged_methods(&def)?;

        let mut address = self.vtables.get(child).map(|v| v.address).unwrap_or(0);
        if address == 0 && !methods.is_empty() {
            address = heap.allocate(
                methods.len() as u32 * 4,
                4,
                Some(TypeInfo::Vtable { class: child.to_string() }),
            );
        }

        self.classes.insert(child.to_string(), def);
        self.vtables.insert(child.to_string(), Vtable { address, methods });
        log::debug!("class {} now inherits from {}", child, parent);
        Ok(())
    }

    /// Allocate an instance of `class`.
    pub fn create_instance<H: Heap + ?Sized>(
        &mut self,
        heap: &mut H,
        class: &str,
    ) -> Result<&Instance, ObjectError> {
        let def = self
            .classes
            .get(class)
            .ok_or_else(|| ObjectError::UnknownClass(class.to_string()))?;

        let size = VTABLE_POINTER_SIZE
            + def
                .fields
                .iter()
                .map(|field| heap.type_size(&field.type_name))
                .sum::<u32>();

        let address = heap.allocate(size, 4, Some(TypeInfo::Instance { class: class.to_string() }));
        if address == 0 {
            return Err(ObjectError::AllocationFailed {
                class: class.to_string(),
                size,
            });
        }

        let vtable = self.vtables.get(class).map(|v| v.address).unwrap_or(0);
        heap.write_memory(address, vtable);

        let id = self.instances.len();
        self.instances.push(Instance {
            id,
            class: class.to_string(),
            address,
            size,
            vtable,
        });
        log::trace!("instance {} of {} at 0x{:08X}", id, class, address);
        Ok(&self.instances[id])
    }

    /// Address of `method` for an instance's class.
    pub fn resolve_method(&self, instance: usize, method: &str) -> Option<u32> {
        let instance = self.instances.get(instance)?;
        self.vtables.get(&instance.class)?.methods.get(method).copied()
    }

    pub fn class(&self, name: &str) -> Option<&ClassDef> {
        self.classes.get(name)
    }

    pub fn vtable(&self, class: &str) -> Option<&Vtable> {
        self.vtables.get(class)
    }

    pub fn instance(&self, id: usize) -> Option<&Instance> {
        self.instances.get(id)
    }

    /// Instance whose allocation starts at `address`.
    pub fn instance_at(&self, address: u32) -> Option<&Instance> {
        self.instances.iter().find(|i| i.address == address)
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Parent's merged methods overlaid with `def`'s own.
    fn merged_methods(&self, def: &ClassDef) -> Result<BTreeMap<String, u32>, ObjectError> {
        let mut methods = match &def.parent {
            Some(parent) => self
                .vtables
                .get(parent)
                .ok_or_else(|| ObjectError::UnknownParent(parent.clone()))?
                .methods
                .clone(),
            None => BTreeMap::new(),
        };
        for method in &def.methods {
            methods.insert(method.name.clone(), method.address);
        }
        Ok(methods)
    }

    /// `name` followed by each ancestor up the parent chain.
    fn ancestry<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        let mut next = Some(name);
        std::iter::from_fn(move || {
            let current = next?;
            next = self.classes.get(current).and_then(|def| def.parent.as_deref());
            Some(current)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::SimulatedHeap;

    fn base_and_derived(heap: &mut SimulatedHeap) -> ObjectSystem {
        let mut objects = ObjectSystem::new();
        objects
            .define_class(
                heap,
                "Base",
                ClassDef::new()
                    .field("f1", "int")
                    .method(MethodDef::new("m1", 0x100))
                    .method(MethodDef::new("shared", 0x110)),
            )
            .unwrap();
        objects
            .define_class(
                heap,
                "Derived",
                ClassDef::new()
                    .parent("Base")
                    .method(MethodDef::new("m2", 0x200))
                    .method(MethodDef::new("shared", 0x210)),
            )
            .unwrap();
        objects
    }

    #[test]
    fn test_derived_vtable_merges_parent() {
        let mut heap = SimulatedHeap::default();
        let objects = base_and_derived(&mut heap);

        let vtable = objects.vtable("Derived").unwrap();
        assert_eq!(vtable.methods.get("m1"), Some(&0x100));
        assert_eq!(vtable.methods.get("m2"), Some(&0x200));
        assert_eq!(vtable.methods.get("shared"), Some(&0x210));

        let info = heap.allocation_info(vtable.address).unwrap();
        assert_eq!(info.size, 12);
        assert_eq!(info.type_info, Some(TypeInfo::Vtable { class: "Derived".into() }));
    }

    #[test]
    fn test_define_class_failures() {
        let mut heap = SimulatedHeap::default();
        let mut objects = base_and_derived(&mut heap);

        assert_eq!(
            objects.define_class(&mut heap, "Base", ClassDef::new()).unwrap_err(),
            ObjectError::DuplicateClass("Base".into())
        );
        assert_eq!(
            objects
                .define_class(&mut heap, "Orphan", ClassDef::new().parent("Missing"))
                .unwrap_err(),
            ObjectError::UnknownParent("Missing".into())
        );
        assert!(objects.class("Orphan").is_none());
    }

    #[test]
    fn test_instance_layout() {
        let mut heap = SimulatedHeap::default();
        let mut objects = base_and_derived(&mut heap);

        let instance = objects.create_instance(&mut heap, "Base").unwrap().clone();
        assert_eq!(instance.size, 8);
        assert_eq!(instance.vtable, objects.vtable("Base").unwrap().address);
        assert_eq!(heap.read_memory(instance.address), instance.vtable);
        assert_eq!(
            heap.allocation_info(instance.address).unwrap().type_info,
            Some(TypeInfo::Instance { class: "Base".into() })
        );
        assert_eq!(objects.instance_at(instance.address).map(|i| i.id), Some(0));

        // Derived declares no fields of its own.
        assert_eq!(objects.create_instance(&mut heap, "Derived").unwrap().size, 4);
        assert_eq!(
            objects.create_instance(&mut heap, "Nope").unwrap_err(),
            ObjectError::UnknownClass("Nope".into())
        );
    }

    #[test]
    fn test_resolve_method() {
        let mut heap = SimulatedHeap::default();
        let mut objects = base_and_derived(&mut heap);
        let id = objects.create_instance(&mut heap, "Derived").unwrap().id;

        assert_eq!(objects.resolve_method(id, "m1"), Some(0x100));
        assert_eq!(objects.resolve_method(id, "missing"), None);
        assert_eq!(objects.resolve_method(99, "m1"), None);
    }

    #[test]
    fn test_inherit_rebuilds_vtable() {
        let mut heap = SimulatedHeap::default();
        let mut objects = ObjectSystem::new();
        objects
            .define_class(&mut heap, "Animal", ClassDef::new().method(MethodDef::new("eat", 1)))
            .unwrap();
        objects.define_class(&mut heap, "Dog", ClassDef::new()).unwrap();
        assert_eq!(objects.vtable("Dog").unwrap().address, 0);

        objects.inherit(&mut heap, "Dog", "Animal").unwrap();
        let vtable = objects.vtable("Dog").unwrap();
        assert_eq!(vtable.methods.get("eat"), Some(&1));
        assert_ne!(vtable.address, 0);
        assert_eq!(objects.class("Dog").unwrap().parent.as_deref(), Some("Animal"));
    }

    #[test]
    fn test_inherit_rejects_cycles() {
        let mut heap = SimulatedHeap::default();
        let mut objects = base_and_derived(&mut heap);
        assert!(matches!(
            objects.inherit(&mut heap, "Base", "Derived"),
            Err(ObjectError::InheritanceCycle { .. })
        ));
        assert!(matches!(
            objects.inherit(&mut heap, "Base", "Base"),
            Err(ObjectError::InheritanceCycle { .. })
        ));
        assert!(matches!(
            objects.inherit(&mut heap, "Ghost", "Base"),
            Err(ObjectError::UnknownClass(_))
        ));
    }
}
