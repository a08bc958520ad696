//! TOML program manifests.
//!
//! A manifest spells instructions with mnemonics and register names and is
//! assembled into instruction words with [`WordBuilder`]:
//!
//! ```toml
//! name = "countdown"
//! max_cycles = 200
//!
//! [[instructions]]
//! op = "MOV"
//! dest = "ECX"
//! imm = 3
//!
//! [[instructions]]
//! label = "loop"
//! op = "DEC"
//! dest = "ECX"
//!
//! [[instructions]]
//! op = "JNE"
//! target = "loop"
//!
//! [[instructions]]
//! op = "HLT"
//!
//! [[expect]]
//! register = "ECX"
//! value = 0
//! ```
//!
//! `target` names a label and assembles to that instruction's index as the
//! immediate. `[[classes]]` and `[[structs]]` entries fill the schema
//! catalog consulted by CLASS_DEFINE and STRUCT_DEFINE.

use serde::Deserialize;
use std::collections::HashMap;

use super::{Expectation, Program, ProgramError};
use crate::interpreter::state::Register;
use crate::interpreter::traits::FieldDef;
use crate::interpreter::word::{layout, InstructionWord, Operation, TypeTag, WordBuilder};
use crate::object::{ClassSchema, MethodDef, SchemaCatalog};

/// Parsed manifest, before assembly.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    pub name: Option<String>,
    pub max_cycles: Option<u64>,
    #[serde(default)]
    pub instructions: Vec<InstructionEntry>,
    #[serde(default)]
    pub classes: Vec<ClassEntry>,
    #[serde(default)]
    pub structs: Vec<StructEntry>,
    #[serde(default)]
    pub expect: Vec<ExpectEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstructionEntry {
    pub label: Option<String>,
    pub op: String,
    pub dest: Option<String>,
    pub src: Option<String>,
    pub imm: Option<i32>,
    /// Label whose index becomes the immediate.
    pub target: Option<String>,
    #[serde(rename = "type")]
    pub type_tag: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MethodEntry {
    pub name: String,
    pub address: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassEntry {
    pub id: u32,
    pub parent: Option<u32>,
    #[serde(default)]
    pub fields: Vec<FieldEntry>,
    #[serde(default)]
    pub methods: Vec<MethodEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StructEntry {
    pub id: u32,
    #[serde(default)]
    pub fields: Vec<FieldEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExpectEntry {
    #[serde(default)]
    pub thread: usize,
    pub register: String,
    pub value: i64,
}

impl Manifest {
    /// Parse manifest text.
    pub fn parse(text: &str) -> Result<Self, ProgramError> {
        Ok(toml::from_str(text)?)
    }

    /// Assemble into a program.
    pub fn assemble(&self) -> Result<Program, ProgramError> {
        let labels = self.labels()?;

        let words = self
            .instructions
            .iter()
            .enumerate()
            .map(|(index, entry)| assemble_instruction(index, entry, &labels))
            .collect::<Result<Vec<_>, _>>()?;

        let expectations = self
            .expect
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let register = parse_register(&entry.register, || format!("expect {}", index))?;
                Ok(Expectation {
                    thread: entry.thread,
                    register,
                    value: entry.value,
                })
            })
            .collect::<Result<Vec<_>, ProgramError>>()?;

        log::debug!(
            "Assembled {} instruction(s), {} label(s), {} expectation(s)",
            words.len(),
            labels.len(),
            expectations.len()
        );

        Ok(Program {
            name: self.name.clone(),
            words,
            catalog: self.catalog(),
            max_cycles: self.max_cycles,
            expectations,
        })
    }

    /// Label name to instruction index.
    fn labels(&self) -> Result<HashMap<&str, usize>, ProgramError> {
        let mut labels = HashMap::new();
        for (index, entry) in self.instructions.iter().enumerate() {
            let Some(label) = entry.label.as_deref() else {
                continue;
            };
            if let Some(first) = labels.insert(label, index) {
                return Err(ProgramError::DuplicateLabel {
                    label: label.to_string(),
                    first,
                    second: index,
                });
            }
        }
        Ok(labels)
    }

    fn catalog(&self) -> SchemaCatalog {
        let mut catalog = SchemaCatalog::new();
        for class in &self.classes {
            catalog.add_class(
                class.id,
                ClassSchema {
                    fields: fields(&class.fields),
                    methods: class
                        .methods
                        .iter()
                        .map(|m| MethodDef::new(m.name.as_str(), m.address))
                        .collect(),
                    parent: class.parent,
                },
            );
        }
        for entry in &self.structs {
            catalog.add_struct(entry.id, fields(&entry.fields));
        }
        catalog
    }
}

fn fields(entries: &[FieldEntry]) -> Vec<FieldDef> {
    entries
        .iter()
        .map(|f| FieldDef::new(f.name.as_str(), f.type_name.as_str()))
        .collect()
}

fn assemble_instruction(
    index: usize,
    entry: &InstructionEntry,
    labels: &HashMap<&str, usize>,
) -> Result<InstructionWord, ProgramError> {
    let op = Operation::from_mnemonic(&entry.op)
        .filter(|op| *op != Operation::Unknown)
        .ok_or_else(|| ProgramError::UnknownOperation {
            index,
            name: entry.op.clone(),
        })?;
    let mut builder = WordBuilder::new(op);

    if let Some(name) = &entry.dest {
        let reg = parse_register(name, || format!("instruction {}", index))?;
        if layout::dest_index(reg).is_none() {
            return Err(ProgramError::UnencodableRegister {
                index,
                register: reg,
                field: "dest",
            });
        }
        builder = builder.dest(reg);
    }

    if let Some(name) = &entry.src {
        let reg = parse_register(name, || format!("instruction {}", index))?;
        if layout::src_index(reg).is_none() {
            return Err(ProgramError::UnencodableRegister {
                index,
                register: reg,
                field: "src",
            });
        }
        builder = builder.src(reg);
    }

    let immediate = match (entry.imm, &entry.target) {
        (Some(_), Some(_)) => return Err(ProgramError::ConflictingImmediate { index }),
        (Some(imm), None) => Some(imm),
        (None, Some(label)) => {
            let target = labels
                .get(label.as_str())
                .ok_or_else(|| ProgramError::UnknownLabel {
                    index,
                    label: label.clone(),
                })?;
            Some(*target as i32)
        }
        (None, None) => None,
    };
    if let Some(imm) = immediate {
        builder = builder.imm(imm);
    }

    if let Some(name) = &entry.type_tag {
        let tag = TypeTag::from_name(name).ok_or_else(|| ProgramError::UnknownType {
            index,
            name: name.clone(),
        })?;
        builder = builder.type_tag(tag);
    }

    Ok(builder.build())
}

fn parse_register(name: &str, location: impl FnOnce() -> String) -> Result<Register, ProgramError> {
    Register::from_name(name).ok_or_else(|| ProgramError::UnknownRegister {
        location: location(),
        name: name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::decode::{DecodedInstruction, WordDecoder};
    use crate::interpreter::traits::Decoder;

    fn decode_all(program: &Program) -> Vec<DecodedInstruction> {
        let decoder = WordDecoder::new();
        program.words.iter().map(|w| decoder.decode(w)).collect()
    }

    #[test]
    fn test_label_resolution() {
        let manifest = Manifest::parse(
            r#"
            [[instructions]]
            op = "JMP"
            target = "end"

            [[instructions]]
            label = "loop"
            op = "dec"
            dest = "ecx"

            [[instructions]]
            op = "JNE"
            target = "loop"

            [[instructions]]
            label = "end"
            op = "HLT"
            "#,
        )
        .unwrap();
        let program = manifest.assemble().unwrap();
        let instrs = decode_all(&program);

        assert_eq!(instrs[0].operation, Operation::Jmp);
        assert_eq!(instrs[0].immediate, Some(3));
        assert_eq!(instrs[1].operation, Operation::Dec);
        assert_eq!(instrs[1].dest, Some(Register::Ecx));
        assert_eq!(instrs[2].immediate, Some(1));
        assert_eq!(instrs[3].operation, Operation::Hlt);
    }

    #[test]
    fn test_operands_and_type() {
        let program = Manifest::parse(
            r#"
            [[instructions]]
            op = "MEM_STORE_SHARED"
            dest = "EBX"
            src = "EDX"

            [[instructions]]
            op = "HEAP_ALLOC"
            imm = 4096
            type = "double"
            "#,
        )
        .unwrap()
        .assemble()
        .unwrap();
        let instrs = decode_all(&program);

        assert_eq!(instrs[0].operation, Operation::MemStoreShared);
        assert_eq!(instrs[0].dest, Some(Register::Ebx));
        assert_eq!(instrs[0].src, Some(Register::Edx));
        assert_eq!(instrs[1].immediate, Some(4096));
        assert_eq!(instrs[1].type_tag, Some(TypeTag::Double));
    }

    #[test]
    fn test_schemas_and_expectations() {
        let program = Manifest::parse(
            r#"
            name = "shapes"
            max_cycles = 50

            [[classes]]
            id = 2
            parent = 1
            fields = [{ name = "radius", type = "float" }]
            methods = [{ name = "area", address = 0x400 }]

            [[structs]]
            id = 1
            fields = [{ name = "x", type = "int" }, { name = "y", type = "int" }]

            [[expect]]
            thread = 1
            register = "EAX"
            value = -1
            "#,
        )
        .unwrap()
        .assemble()
        .unwrap();

        assert_eq!(program.name.as_deref(), Some("shapes"));
        assert_eq!(program.max_cycles, Some(50));
        assert!(program.is_empty());

        let class = program.catalog.class_schema(2);
        assert_eq!(class.parent, Some(1));
        assert_eq!(class.methods, vec![MethodDef::new("area", 0x400)]);
        assert_eq!(class.fields, vec![FieldDef::new("radius", "float")]);
        assert_eq!(program.catalog.struct_fields(1).len(), 2);

        assert_eq!(
            program.expectations,
            vec![Expectation {
                thread: 1,
                register: Register::Eax,
                value: -1,
            }]
        );
    }

    #[test]
    fn test_errors() {
        let assemble = |text: &str| Manifest::parse(text).and_then(|m| m.assemble());

        assert!(matches!(
            assemble("[[instructions]]\nop = \"FROB\""),
            Err(ProgramError::UnknownOperation { index: 0, .. })
        ));
        assert!(matches!(
            assemble("[[instructions]]\nop = \"MOV\"\ndest = \"R9\""),
            Err(ProgramError::UnknownRegister { .. })
        ));
        assert!(matches!(
            assemble("[[instructions]]\nop = \"ADD\"\nsrc = \"AX\""),
            Err(ProgramError::UnencodableRegister { field: "src", .. })
        ));
        assert!(matches!(
            assemble("[[instructions]]\nop = \"HEAP_ALLOC\"\ntype = \"quad\""),
            Err(ProgramError::UnknownType { .. })
        ));
        assert!(matches!(
            assemble("[[instructions]]\nop = \"JMP\"\ntarget = \"nowhere\""),
            Err(ProgramError::UnknownLabel { .. })
        ));
        assert!(matches!(
            assemble("[[instructions]]\nop = \"JMP\"\nimm = 1\ntarget = \"a\"\nlabel = \"a\""),
            Err(ProgramError::ConflictingImmediate { index: 0 })
        ));
        assert!(matches!(
            assemble("[[instructions]]\nop = \"NOP\"\nlabel = \"a\"\n[[instructions]]\nop = \"NOP\"\nlabel = \"a\""),
            Err(ProgramError::DuplicateLabel { first: 0, second: 1, .. })
        ));
        assert!(matches!(assemble("bogus = 1"), Err(ProgramError::Toml(_))));
    }
}
