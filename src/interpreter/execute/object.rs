//! Object and struct execution unit.
//!
//! Classes and structs are named by a numeric id held in EAX (`Class_<id>`,
//! `Struct_<id>`); their schemas come from the machine's schema catalog.
//!
//! | Operation | Inputs | Output |
//! |-----------|--------|--------|
//! | CLASS_DEFINE | EAX = class id | 1 / 0 |
//! | CLASS_INST | EAX = class id | EAX = instance address |
//! | INHERIT | EAX = child id, EBX = parent id | 1 / 0 |
//! | POLYMORPH | EAX = address | EAX = class id |
//! | TYPE_CAST | EAX = address | EAX unchanged |
//! | STRUCT_DEFINE | EAX = struct id | 1 / 0 |
//! | STRUCT_INIT | EAX = struct id | EAX = struct address |
//! | STRUCT_FIELD | EAX = address, index = imm / EBX | dest/EAX = field cell |
//! | PTR_CREATE | EAX = target, type tag | EAX = pointer id |
//! | PTR_DEREF | EAX = pointer id | EAX = target cell |

use crate::interpreter::decode::DecodedInstruction;
use crate::interpreter::machine::Machine;
use crate::interpreter::state::{Gpr, Register};
use crate::interpreter::traits::{Heap, TypeInfo};
use crate::interpreter::word::{Operation, TypeTag};
use crate::object::{class_name, parse_class_id, struct_name, ClassDef};

use super::Outcome;

/// Alignment used for struct allocations and layouts.
pub const STRUCT_ALIGNMENT: u32 = 4;

/// Object/struct unit.
pub struct ObjectUnit;

impl ObjectUnit {
    /// Execute an object or struct operation for thread `tid`.
    ///
    /// Returns `None` if the operation does not belong to this unit.
    pub fn execute<H: Heap>(m: &mut Machine<H>, tid: usize, instr: &DecodedInstruction) -> Option<Outcome> {
        let eax = m.ctx(tid).regs.get(Gpr::Eax);

        let outcome = match instr.operation {
            Operation::ClassDefine => {
                let schema = m.catalog.class_schema(eax);
                let def = ClassDef {
                    fields: schema.fields,
                    methods: schema.methods,
                    parent: schema.parent.map(class_name),
                };
                let defined = m.objects.define_class(&mut m.heap, &class_name(eax), def);
                if let Err(e) = &defined {
                    log::debug!("CLASS_DEFINE {}: {}", eax, e);
                }
                Outcome::next(defined.is_ok() as i64)
            }

            Operation::ClassInst => {
                let address = match m.objects.create_instance(&mut m.heap, &class_name(eax)) {
                    Ok(instance) => instance.address,
                    Err(e) => {
                        log::debug!("CLASS_INST {}: {}", eax, e);
                        0
                    }
                };
                Self::return_value(m, tid, address)
            }

            Operation::Inherit => {
                let parent = m.ctx(tid).regs.get(Gpr::Ebx);
                let linked = m
                    .objects
                    .inherit(&mut m.heap, &class_name(eax), &class_name(parent));
                if let Err(e) = &linked {
                    log::debug!("INHERIT {} <- {}: {}", eax, parent, e);
                }
                Outcome::next(linked.is_ok() as i64)
            }

            Operation::Polymorph => match m.heap.allocation_info(eax) {
                None => Outcome::next(0),
                Some(info) => {
                    let class_id = info
                        .type_info
                        .as_ref()
                        .and_then(TypeInfo::class_name)
                        .and_then(parse_class_id)
                        .unwrap_or(1);
                    m.ctx(tid).regs.set(Gpr::Eax, class_id);
                    Outcome::next(class_id as i64)
                }
            },

            Operation::TypeCast => Outcome::next(eax as i64),

            Operation::StructDefine => {
                let fields = m.catalog.struct_fields(eax);
                let defined = m.heap.define_struct(&struct_name(eax), &fields, STRUCT_ALIGNMENT);
                Outcome::next(defined as i64)
            }

            Operation::StructInit => {
                let name = struct_name(eax);
                let size = m.heap.type_size(&name);
                let address = if size == 0 {
                    log::debug!("STRUCT_INIT of undefined {}", name);
                    0
                } else {
                    m.heap.allocate(size, STRUCT_ALIGNMENT, Some(TypeInfo::Struct { name }))
                };
                Self::return_value(m, tid, address)
            }

            Operation::StructField => {
                let index = match instr.immediate {
                    Some(imm) => imm as i64,
                    None => m.ctx(tid).regs.get(Gpr::Ebx) as i64,
                };
                let field = match m.heap.allocation_info(eax).and_then(|info| info.type_info) {
                    Some(TypeInfo::Struct { name }) => usize::try_from(index)
                        .ok()
                        .and_then(|index| m.heap.struct_field(&name, index)),
                    _ => None,
                };
                match field {
                    Some(field) => {
                        let value = m.heap.read_memory(eax.wrapping_add(field.offset));
                        m.ctx(tid).write(instr.dest.unwrap_or(Register::Eax), value);
                        Outcome::next(value as i64)
                    }
                    None => Outcome::next(0),
                }
            }

            Operation::PtrCreate => {
                let target_type = instr.type_tag.unwrap_or(TypeTag::Int).name();
                let id = m.heap.create_pointer(eax, target_type).unwrap_or(0);
                m.ctx(tid).regs.set(Gpr::Eax, id);
                Outcome::next(id as i64)
            }

            Operation::PtrDeref => match m.heap.pointer(eax) {
                Some(pointer) => {
                    let value = m.heap.read_memory(pointer.target);
                    Self::return_value(m, tid, value)
                }
                None => Outcome::next(0),
            },

            _ => return None,
        };
        Some(outcome)
    }

    /// Store a non-zero value in EAX.
    fn return_value<H: Heap>(m: &mut Machine<H>, tid: usize, value: u32) -> Outcome {
        if value != 0 {
            m.ctx(tid).regs.set(Gpr::Eax, value);
        }
        Outcome::next(value as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::traits::FieldDef;
    use crate::object::{ClassSchema, MethodDef};

    fn run(m: &mut Machine, op: Operation, eax: u32) -> Outcome {
        m.ctx(0).regs.set(Gpr::Eax, eax);
        ObjectUnit::execute(m, 0, &DecodedInstruction::new(op)).unwrap()
    }

    #[test]
    fn test_class_define_default_schema() {
        let mut m: Machine = Machine::default();
        assert_eq!(run(&mut m, Operation::ClassDefine, 2), Outcome::next(1));
        assert_eq!(run(&mut m, Operation::ClassDefine, 2), Outcome::next(0));

        let vtable = m.objects.vtable("Class_2").unwrap();
        assert_eq!(vtable.methods.get("speak"), Some(&0x2000));
        assert_eq!(vtable.methods.get("move"), Some(&0x2020));
    }

    #[test]
    fn test_class_inst_and_polymorph() {
        let mut m: Machine = Machine::default();
        run(&mut m, Operation::ClassDefine, 3);

        let out = run(&mut m, Operation::ClassInst, 3);
        let address = out.result as u32;
        assert_ne!(address, 0);
        assert_eq!(m.ctx(0).read(Register::Eax), address);
        // 4-byte vtable pointer + one int field
        assert_eq!(m.objects.instance_at(address).unwrap().size, 8);

        assert_eq!(run(&mut m, Operation::Polymorph, address), Outcome::next(3));
        assert_eq!(m.ctx(0).read(Register::Eax), 3);

        // Unknown class
        assert_eq!(run(&mut m, Operation::ClassInst, 9), Outcome::next(0));
        assert_eq!(m.ctx(0).read(Register::Eax), 9);
    }

    #[test]
    fn test_polymorph_sentinels() {
        let mut m: Machine = Machine::default();
        assert_eq!(run(&mut m, Operation::Polymorph, 0x1234), Outcome::next(0));

        let plain = m.heap.allocate(8, 4, Some(TypeInfo::Tagged(TypeTag::Int)));
        assert_eq!(run(&mut m, Operation::Polymorph, plain), Outcome::next(1));
        assert_eq!(m.ctx(0).read(Register::Eax), 1);
    }

    #[test]
    fn test_inherit_from_catalog() {
        let mut m: Machine = Machine::default();
        m.catalog.add_class(
            1,
            ClassSchema {
                fields: vec![],
                methods: vec![MethodDef::new("m1", 0x10)],
                parent: None,
            },
        );
        m.catalog.add_class(
            2,
            ClassSchema {
                fields: vec![],
                methods: vec![MethodDef::new("m2", 0x20)],
                parent: None,
            },
        );
        run(&mut m, Operation::ClassDefine, 1);
        run(&mut m, Operation::ClassDefine, 2);

        m.ctx(0).regs.set(Gpr::Ebx, 1);
        assert_eq!(run(&mut m, Operation::Inherit, 2), Outcome::next(1));
        let methods = &m.objects.vtable("Class_2").unwrap().methods;
        assert_eq!(methods.get("m1"), Some(&0x10));
        assert_eq!(methods.get("m2"), Some(&0x20));

        // Cycle rejected
        m.ctx(0).regs.set(Gpr::Ebx, 2);
        assert_eq!(run(&mut m, Operation::Inherit, 1), Outcome::next(0));
    }

    #[test]
    fn test_struct_define_init_field() {
        let mut m: Machine = Machine::default();
        m.catalog.add_struct(
            1,
            vec![FieldDef::new("tag", "char"), FieldDef::new("value", "int")],
        );

        assert_eq!(run(&mut m, Operation::StructInit, 1), Outcome::next(0));
        assert_eq!(run(&mut m, Operation::StructDefine, 1), Outcome::next(1));
        assert_eq!(m.heap.type_size("Struct_1"), 8);

        let address = run(&mut m, Operation::StructInit, 1).result as u32;
        assert_ne!(address, 0);
        m.heap.write_memory(address + 4, 77);

        let field = DecodedInstruction {
            dest: Some(Register::Edx),
            immediate: Some(1),
            ..DecodedInstruction::new(Operation::StructField)
        };
        assert_eq!(ObjectUnit::execute(&mut m, 0, &field), Some(Outcome::next(77)));
        assert_eq!(m.ctx(0).read(Register::Edx), 77);

        let missing = DecodedInstruction {
            immediate: Some(5),
            ..field
        };
        assert_eq!(ObjectUnit::execute(&mut m, 0, &missing), Some(Outcome::next(0)));
    }

    #[test]
    fn test_pointers() {
        let mut m: Machine = Machine::default();
        m.heap.write_memory(0x300, 41);

        let create = DecodedInstruction {
            type_tag: Some(TypeTag::Double),
            ..DecodedInstruction::new(Operation::PtrCreate)
        };
        m.ctx(0).regs.set(Gpr::Eax, 0x300);
        let id = ObjectUnit::execute(&mut m, 0, &create).unwrap().result as u32;
        assert_eq!(id, 1);
        assert_eq!(m.heap.pointer(id).unwrap().target_type, "double");

        assert_eq!(run(&mut m, Operation::PtrDeref, id), Outcome::next(41));
        assert_eq!(run(&mut m, Operation::PtrDeref, 99), Outcome::next(0));
    }

    #[test]
    fn test_type_cast_passthrough() {
        let mut m: Machine = Machine::default();
        assert_eq!(run(&mut m, Operation::TypeCast, 0xABC), Outcome::next(0xABC));
    }
}
