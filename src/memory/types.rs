//! Type registry: primitive sizes, struct layouts and typed pointers.
//!
//! | Type | Size | Alignment |
//! |------|------|-----------|
//! | void | 0 | 1 |
//! | bool | 1 | 1 |
//! | char | 1 | 1 |
//! | int | 4 | 4 |
//! | float | 4 | 4 |
//! | double | 8 | 8 |
//! | string | 32 | 1 |
//!
//! Struct fields are placed at the next offset aligned to the field's own
//! alignment; the total is rounded up to the struct's alignment.

use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

use crate::interpreter::traits::{FieldDef, FieldLayout, PointerInfo};

/// Errors from type registration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("type '{0}' is already defined")]
    Duplicate(String),

    #[error("field '{field}' has unknown or zero-sized type '{type_name}'")]
    BadField { field: String, type_name: String },

    #[error("unknown type '{0}'")]
    Unknown(String),
}

/// Size and alignment of a registered type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeDesc {
    pub size: u32,
    pub alignment: u32,
}

/// Computed layout of a struct type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructLayout {
    pub name: String,
    pub fields: Vec<FieldLayout>,
    pub size: u32,
    pub alignment: u32,
}

/// Registry of known types.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    types: HashMap<String, TypeDesc>,
    structs: HashMap<String, StructLayout>,
    pointers: BTreeMap<u32, PointerInfo>,
    next_pointer: u32,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Round `value` up to a multiple of `alignment` (a power of two).
#[inline]
pub(crate) fn align_up(value: u32, alignment: u32) -> Option<u32> {
    let mask = alignment.max(1) - 1;
    value.checked_add(mask).map(|v| v & !mask)
}

impl TypeRegistry {
    /// Registry holding only the primitive types.
    pub fn new() -> Self {
        let primitives = [
            ("void", 0, 1),
            ("bool", 1, 1),
            ("char", 1, 1),
            ("int", 4, 4),
            ("float", 4, 4),
            ("double", 8, 8),
            ("string", 32, 1),
        ];
        let types = primitives
            .iter()
            .map(|(name, size, alignment)| {
                (name.to_string(), TypeDesc { size: *size, alignment: *alignment })
            })
            .collect();

        Self {
            types,
            structs: HashMap::new(),
            pointers: BTreeMap::new(),
            next_pointer: 1,
        }
    }

    pub fn get(&self, name: &str) -> Option<TypeDesc> {
        self.types.get(name).copied()
    }

    /// Size of a type, 0 if unknown.
    pub fn size_of(&self, name: &str) -> u32 {
        self.get(name).map(|t| t.size).unwrap_or(0)
    }

    /// Alignment of a type, 1 if unknown.
    pub fn alignment_of(&self, name: &str) -> u32 {
        self.get(name).map(|t| t.alignment).unwrap_or(1)
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Lay out and register a struct.
    pub fn define_struct(
        &mut self,
        name: &str,
        fields: &[FieldDef],
        alignment: u32,
    ) -> Result<&StructLayout, TypeError> {
        if self.types.contains_key(name) {
            return Err(TypeError::Duplicate(name.to_string()));
        }

        let alignment = alignment.max(1);
        let mut offset = 0u32;
        let mut layouts = Vec::with_capacity(fields.len());

        for field in fields {
            let desc = self
                .get(&field.type_name)
                .filter(|desc| desc.size > 0)
                .ok_or_else(|| TypeError::BadField {
                    field: field.name.clone(),
                    type_name: field.type_name.clone(),
                })?;

            offset = align_up(offset, desc.alignment)
                .ok_or_else(|| TypeError::Unknown(name.to_string()))?;
            layouts.push(FieldLayout {
                name: field.name.clone(),
                type_name: field.type_name.clone(),
                offset,
                size: desc.size,
            });
            offset += desc.size;
        }

        let size = align_up(offset, alignment).ok_or_else(|| TypeError::Unknown(name.to_string()))?;
        self.types.insert(name.to_string(), TypeDesc { size, alignment });
        log::debug!("struct {} defined: {} fields, {} bytes", name, layouts.len(), size);

        let layout = self.structs.entry(name.to_string()).or_insert(StructLayout {
            name: name.to_string(),
            fields: layouts,
            size,
            alignment,
        });
        Ok(layout)
    }

    pub fn struct_layout(&self, name: &str) -> Option<&StructLayout> {
        self.structs.get(name)
    }

    /// Register a pointer to `target` of type `target_type`.
    pub fn create_pointer(&mut self, target: u32, target_type: &str) -> Result<u32, TypeError> {
        if !self.is_known(target_type) {
            return Err(TypeError::Unknown(target_type.to_string()));
        }
        let id = self.next_pointer;
        self.next_pointer += 1;
        self.pointers.insert(
            id,
            PointerInfo {
                id,
                target,
                target_type: target_type.to_string(),
            },
        );
        Ok(id)
    }

    pub fn pointer(&self, id: u32) -> Option<&PointerInfo> {
        self.pointers.get(&id)
    }

    pub fn pointer_count(&self) -> usize {
        self.pointers.len()
    }
}
