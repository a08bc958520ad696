//! Class and struct schemas addressed by numeric id.
//!
//! Object and struct opcodes name their type by an integer held in a
//! register. The catalog maps that id to a schema supplied by the program;
//! ids without an entry fall back to a built-in default schema.

use std::collections::BTreeMap;

use super::MethodDef;
use crate::interpreter::traits::FieldDef;

const CLASS_PREFIX: &str = "Class_";
const STRUCT_PREFIX: &str = "Struct_";

/// Schema for a class id.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClassSchema {
    pub fields: Vec<FieldDef>,
    pub methods: Vec<MethodDef>,
    /// Parent class id.
    pub parent: Option<u32>,
}

/// Program-supplied schemas.
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    classes: BTreeMap<u32, ClassSchema>,
    structs: BTreeMap<u32, Vec<FieldDef>>,
}

impl SchemaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_class(&mut self, id: u32, schema: ClassSchema) {
        self.classes.insert(id, schema);
    }

    pub fn add_struct(&mut self, id: u32, fields: Vec<FieldDef>) {
        self.structs.insert(id, fields);
    }

    /// Schema for a class id, or the default one-field/two-method schema.
    pub fn class_schema(&self, id: u32) -> ClassSchema {
        self.classes.get(&id).cloned().unwrap_or_else(|| ClassSchema {
            fields: vec![FieldDef::new("base_field", "int")],
            methods: vec![
                MethodDef::new("speak", 0x1000u32.wrapping_mul(id)),
                MethodDef::new("move", 0x1010u32.wrapping_mul(id)),
            ],
            parent: None,
        })
    }

    /// Fields for a struct id, or the default int/float/char layout.
    pub fn struct_fields(&self, id: u32) -> Vec<FieldDef> {
        self.structs.get(&id).cloned().unwrap_or_else(|| {
            vec![
                FieldDef::new("field1", "int"),
                FieldDef::new("field2", "float"),
                FieldDef::new("field3", "char"),
            ]
        })
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn struct_count(&self) -> usize {
        self.structs.len()
    }
}

/// Registry name of a class id.
pub fn class_name(id: u32) -> String {
    format!("{}{}", CLASS_PREFIX, id)
}

/// Registry name of a struct id.
pub fn struct_name(id: u32) -> String {
    format!("{}{}", STRUCT_PREFIX, id)
}

/// Class id encoded in a registry name.
pub fn parse_class_id(name: &str) -> Option<u32> {
    name.strip_prefix(CLASS_PREFIX)?.parse().ok()
}
