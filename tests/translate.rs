//! End-to-end tests: assemble class file bytes, parse them, and translate
//! the method bodies into register code.

use class2reg::class_file::ClassFile;
use class2reg::link::{LinkEntry, MemberKind};
use class2reg::register::{
    BinOp, Condition, ConstValue, RegClass, Register, RegisterInstruction,
};
use class2reg::state::{VarKind, VarType};
use class2reg::translate::{translate_class, MethodTranslator, TranslatorSettings};

/// Assembles a minimal class file: constant pool, flags, one superclass,
/// optional interfaces and methods, no fields
#[derive(Default)]
struct ClassBuilder {
    pool: Vec<Vec<u8>>,
    interfaces: Vec<u16>,
    fields: Vec<Vec<u8>>,
    methods: Vec<Vec<u8>>,
}

impl ClassBuilder {
    fn new() -> ClassBuilder {
        ClassBuilder::default()
    }

    fn utf8(&mut self, s: &str) -> u16 {
        let mut entry = vec![1u8];
        entry.extend((s.len() as u16).to_be_bytes());
        entry.extend(s.as_bytes());
        self.pool.push(entry);
        self.pool.len() as u16
    }

    fn class(&mut self, name: &str) -> u16 {
        let name_index = self.utf8(name);
        let mut entry = vec![7u8];
        entry.extend(name_index.to_be_bytes());
        self.pool.push(entry);
        self.pool.len() as u16
    }

    fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        let mut entry = vec![12u8];
        entry.extend(name_index.to_be_bytes());
        entry.extend(descriptor_index.to_be_bytes());
        self.pool.push(entry);
        self.pool.len() as u16
    }

    fn field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.class(class);
        let nat_index = self.name_and_type(name, descriptor);
        let mut entry = vec![9u8];
        entry.extend(class_index.to_be_bytes());
        entry.extend(nat_index.to_be_bytes());
        self.pool.push(entry);
        self.pool.len() as u16
    }

    fn implements(&mut self, name: &str) {
        let index = self.class(name);
        self.interfaces.push(index);
    }

    fn field(&mut self, flags: u16, name: &str, descriptor: &str) {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        let mut record = Vec::new();
        record.extend(flags.to_be_bytes());
        record.extend(name_index.to_be_bytes());
        record.extend(descriptor_index.to_be_bytes());
        record.extend(0u16.to_be_bytes());
        self.fields.push(record);
    }

    fn method(
        &mut self,
        flags: u16,
        name: &str,
        descriptor: &str,
        max_stack: u16,
        max_locals: u16,
        code: &[u8],
        lines: &[(u16, u16)],
    ) {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        let code_name = self.utf8("Code");

        let mut payload = Vec::new();
        payload.extend(max_stack.to_be_bytes());
        payload.extend(max_locals.to_be_bytes());
        payload.extend((code.len() as u32).to_be_bytes());
        payload.extend_from_slice(code);
        payload.extend(0u16.to_be_bytes()); // no exception handlers
        if lines.is_empty() {
            payload.extend(0u16.to_be_bytes());
        } else {
            let table_name = self.utf8("LineNumberTable");
            payload.extend(1u16.to_be_bytes());
            payload.extend(table_name.to_be_bytes());
            payload.extend(((2 + 4 * lines.len()) as u32).to_be_bytes());
            payload.extend((lines.len() as u16).to_be_bytes());
            for (start, line) in lines {
                payload.extend(start.to_be_bytes());
                payload.extend(line.to_be_bytes());
            }
        }

        let mut record = Vec::new();
        record.extend(flags.to_be_bytes());
        record.extend(name_index.to_be_bytes());
        record.extend(descriptor_index.to_be_bytes());
        record.extend(1u16.to_be_bytes());
        record.extend(code_name.to_be_bytes());
        record.extend((payload.len() as u32).to_be_bytes());
        record.extend(payload);
        self.methods.push(record);
    }

    fn abstract_method(&mut self, flags: u16, name: &str, descriptor: &str) {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        let mut record = Vec::new();
        record.extend(flags.to_be_bytes());
        record.extend(name_index.to_be_bytes());
        record.extend(descriptor_index.to_be_bytes());
        record.extend(0u16.to_be_bytes());
        self.methods.push(record);
    }

    fn build(mut self, flags: u16, this: &str, superclass: Option<&str>) -> Vec<u8> {
        let this_index = self.class(this);
        let super_index = superclass.map_or(0, |name| self.class(name));

        let mut bytes = vec![0xca, 0xfe, 0xba, 0xbe, 0x00, 0x00, 0x00, 0x34];
        bytes.extend((self.pool.len() as u16 + 1).to_be_bytes());
        for entry in &self.pool {
            bytes.extend_from_slice(entry);
        }
        bytes.extend(flags.to_be_bytes());
        bytes.extend(this_index.to_be_bytes());
        bytes.extend(super_index.to_be_bytes());
        bytes.extend((self.interfaces.len() as u16).to_be_bytes());
        for index in &self.interfaces {
            bytes.extend(index.to_be_bytes());
        }
        bytes.extend((self.fields.len() as u16).to_be_bytes());
        for record in &self.fields {
            bytes.extend_from_slice(record);
        }
        bytes.extend((self.methods.len() as u16).to_be_bytes());
        for record in &self.methods {
            bytes.extend_from_slice(record);
        }
        bytes.extend(0u16.to_be_bytes()); // no class attributes
        bytes
    }
}

const PUBLIC: u16 = 0x0001;
const STATIC: u16 = 0x0008;
const FINAL: u16 = 0x0010;
const SUPER: u16 = 0x0020;
const INTERFACE: u16 = 0x0200;
const ABSTRACT: u16 = 0x0400;

fn reg(index: u16, class: RegClass) -> Register {
    Register { index, class }
}

#[test]
fn straight_line_method_translates_one_to_one() {
    let mut builder = ClassBuilder::new();
    builder.implements("java/lang/Runnable");
    builder.field(PUBLIC, "first", "I");
    builder.field(PUBLIC | STATIC, "second", "Ljava/lang/String;");
    // static int add(int, int) { return arg0 + arg1; }
    builder.method(
        PUBLIC | STATIC,
        "add",
        "(II)I",
        2,
        2,
        &[0x1a, 0x1b, 0x60, 0xac],
        &[],
    );
    let bytes = builder.build(PUBLIC | SUPER, "Example", Some("java/lang/Object"));

    let mut parsed = ClassFile::parse(&bytes).unwrap();
    assert_eq!(parsed.links.len(), 3); // export, extends, implements
    assert_eq!(parsed.class.fields.len(), 2);
    assert_eq!(parsed.class.fields[0].name, "first");
    assert!(parsed.class.fields[0].constant_value.is_none());

    let methods = translate_class(&mut parsed, TranslatorSettings::default()).unwrap();
    assert_eq!(methods.len(), 1);
    let (name, descriptor, code) = &methods[0];
    assert_eq!(name, "add");
    assert_eq!(descriptor, "(II)I");

    // One register instruction per input instruction; stack bank starts
    // after the two locals
    assert_eq!(code.len(), 4);
    assert_eq!(
        code.get(0),
        Some(&RegisterInstruction::Copy {
            to: reg(2, RegClass::Int),
            from: reg(0, RegClass::Int),
        })
    );
    assert_eq!(
        code.get(1),
        Some(&RegisterInstruction::Copy {
            to: reg(3, RegClass::Int),
            from: reg(1, RegClass::Int),
        })
    );
    assert_eq!(
        code.get(2),
        Some(&RegisterInstruction::BinOp {
            op: BinOp::Add,
            to: reg(2, RegClass::Int),
            lhs: reg(2, RegClass::Int),
            rhs: reg(3, RegClass::Int),
        })
    );
    assert_eq!(
        code.get(3),
        Some(&RegisterInstruction::Return {
            value: Some(reg(2, RegClass::Int)),
        })
    );
}

#[test]
fn stack_depths_and_types_recorded_per_program_counter() {
    let mut builder = ClassBuilder::new();
    // static int calc() { int x = 2 + 3; return x; }
    builder.method(
        PUBLIC | STATIC,
        "calc",
        "()I",
        2,
        1,
        &[0x05, 0x06, 0x60, 0x3b, 0x1a, 0xac],
        &[],
    );
    let bytes = builder.build(PUBLIC | SUPER, "Example", Some("java/lang/Object"));
    let mut parsed = ClassFile::parse(&bytes).unwrap();

    let method = &parsed.class.methods[0];
    let translator = MethodTranslator::new(
        &parsed.pool,
        &mut parsed.links,
        parsed.class.this_link,
        method,
        TranslatorSettings::default(),
    )
    .unwrap();
    let (code, mut state) = translator.translate().unwrap();
    assert_eq!(code.len(), 6);

    // The stack depth entering each instruction
    for (pc, depth) in [(0, 0), (1, 1), (2, 2), (3, 1), (4, 0), (5, 1)] {
        assert_eq!(state.stack_top(pc), depth, "stack top at pc {}", pc);
    }

    // iconst_2 committed an int at stack position 0 for the next pc
    let pushed = state.slot_at(VarKind::Stack, 1, 0).unwrap();
    assert_eq!(state.type_of(pushed).unwrap(), VarType::Integer);

    // istore_0 committed an int into local 0 for the next pc
    let local = state.slot_at(VarKind::Locals, 5, 0).unwrap();
    assert_eq!(state.type_of(local).unwrap(), VarType::Integer);

    // Position 1 held an int at pc 2, but the stack shrank below it since;
    // the stack boundary wins over that history
    let truncated = state.slot_at(VarKind::Stack, 4, 1).unwrap();
    assert_eq!(state.type_of(truncated).unwrap(), VarType::Nothing);
}

#[test]
fn matching_frames_at_a_join_merge() {
    let mut builder = ClassBuilder::new();
    // static int pick(int) { return arg0 != 0 ? 1 : 0; }
    let code = &[
        0x1a, // 0: iload_0
        0x9a, 0x00, 0x07, // 1: ifne -> 8
        0x03, // 4: iconst_0
        0xa7, 0x00, 0x04, // 5: goto -> 9
        0x04, // 8: iconst_1
        0x3c, // 9: istore_1
        0x1b, // 10: iload_1
        0xac, // 11: ireturn
    ];
    builder.method(PUBLIC | STATIC, "pick", "(I)I", 1, 2, code, &[]);
    let bytes = builder.build(PUBLIC | SUPER, "Example", Some("java/lang/Object"));

    let mut parsed = ClassFile::parse(&bytes).unwrap();
    let methods = translate_class(&mut parsed, TranslatorSettings::default()).unwrap();
    let (_, _, code) = &methods[0];
    assert_eq!(code.len(), 8);

    // Branch targets are rewritten to instruction indices
    assert_eq!(
        code.get(1),
        Some(&RegisterInstruction::JumpIf {
            condition: Condition::Ne,
            value: reg(2, RegClass::Int),
            target: 4,
        })
    );
    assert_eq!(code.get(3), Some(&RegisterInstruction::Jump { target: 5 }));
}

#[test]
fn diverging_frames_at_a_join_are_rejected() {
    let mut builder = ClassBuilder::new();
    // One edge reaches pc 8 with an empty stack, the other with a float
    let code = &[
        0x1a, // 0: iload_0
        0x99, 0x00, 0x07, // 1: ifeq -> 8
        0x0b, // 4: fconst_0
        0xa7, 0x00, 0x03, // 5: goto -> 8
        0xb1, // 8: return
    ];
    builder.method(PUBLIC | STATIC, "bad", "(I)V", 1, 1, code, &[]);
    let bytes = builder.build(PUBLIC | SUPER, "Example", Some("java/lang/Object"));

    let mut parsed = ClassFile::parse(&bytes).unwrap();
    let err = translate_class(&mut parsed, TranslatorSettings::default()).unwrap_err();
    assert_eq!(err.code(), "TR05");
    assert!(matches!(
        err,
        class2reg::Error::FrameMergeConflict { target: 8 }
    ));
}

#[test]
fn branch_into_the_middle_of_an_instruction_rejected() {
    let mut builder = ClassBuilder::new();
    let code = &[
        0x03, // 0: iconst_0
        0x99, 0x00, 0x02, // 1: ifeq -> 3, inside this very instruction
        0xb1, // 4: return
    ];
    builder.method(PUBLIC | STATIC, "bad", "()V", 1, 0, code, &[]);
    let bytes = builder.build(PUBLIC | SUPER, "Example", Some("java/lang/Object"));

    let mut parsed = ClassFile::parse(&bytes).unwrap();
    let err = translate_class(&mut parsed, TranslatorSettings::default()).unwrap_err();
    assert_eq!(err.code(), "TR07");
}

#[test]
fn member_references_deduplicate_in_link_table() {
    let mut builder = ClassBuilder::new();
    let field = builder.field_ref("Counter", "count", "I");
    // static void bump() { count = count + 1; }
    let code = &[
        0xb2,
        (field >> 8) as u8,
        field as u8, // 0: getstatic
        0x04, // 3: iconst_1
        0x60, // 4: iadd
        0xb3,
        (field >> 8) as u8,
        field as u8, // 5: putstatic
        0xb1, // 8: return
    ];
    builder.method(PUBLIC | STATIC, "bump", "()V", 2, 0, code, &[]);
    let bytes = builder.build(PUBLIC | SUPER, "Counter", Some("java/lang/Object"));

    let mut parsed = ClassFile::parse(&bytes).unwrap();
    assert_eq!(parsed.links.len(), 2); // export, extends

    let methods = translate_class(&mut parsed, TranslatorSettings::default()).unwrap();
    // Both field accesses resolve to one new link entry
    assert_eq!(parsed.links.len(), 3);

    let (_, _, code) = &methods[0];
    let get_field = match code.get(0) {
        Some(RegisterInstruction::GetStatic { field, .. }) => *field,
        other => panic!("expected getstatic, got {:?}", other),
    };
    let put_field = match code.get(3) {
        Some(RegisterInstruction::PutStatic { field, .. }) => *field,
        other => panic!("expected putstatic, got {:?}", other),
    };
    assert_eq!(get_field, put_field);

    match parsed.links.get(get_field) {
        Some(LinkEntry::MemberRef {
            kind,
            class,
            name,
            descriptor,
            ..
        }) => {
            assert_eq!(*kind, MemberKind::Field);
            assert_eq!(class.as_str(), "Counter");
            assert_eq!(name, "count");
            assert_eq!(descriptor, "I");
        }
        other => panic!("expected a member reference, got {:?}", other),
    }
}

#[test]
fn constants_materialize_into_registers() {
    let mut builder = ClassBuilder::new();
    // static void go() { int a = 5; a = a - 1; }
    let code = &[
        0x08, // 0: iconst_5
        0x3b, // 1: istore_0
        0x1a, // 2: iload_0
        0x04, // 3: iconst_1
        0x64, // 4: isub
        0x3b, // 5: istore_0
        0xb1, // 6: return
    ];
    builder.method(PUBLIC | STATIC, "go", "()V", 2, 1, code, &[]);
    let bytes = builder.build(PUBLIC | SUPER, "Example", Some("java/lang/Object"));

    let mut parsed = ClassFile::parse(&bytes).unwrap();
    let methods = translate_class(&mut parsed, TranslatorSettings::default()).unwrap();
    let (_, _, code) = &methods[0];
    assert_eq!(
        code.get(0),
        Some(&RegisterInstruction::Const {
            to: reg(1, RegClass::Int),
            value: ConstValue::Integer(5),
        })
    );
    assert_eq!(
        code.get(4),
        Some(&RegisterInstruction::BinOp {
            op: BinOp::Sub,
            to: reg(1, RegClass::Int),
            lhs: reg(1, RegClass::Int),
            rhs: reg(2, RegClass::Int),
        })
    );
}

#[test]
fn stack_bank_past_the_register_index_space_rejected() {
    let mut builder = ClassBuilder::new();
    // With every register index taken by locals, the second stack slot has
    // nowhere to live
    let code = &[
        0x03, // 0: iconst_0
        0x03, // 1: iconst_0
        0x57, // 2: pop
        0x57, // 3: pop
        0xb1, // 4: return
    ];
    builder.method(PUBLIC | STATIC, "huge", "()V", 2, 0xFFFF, code, &[]);
    let bytes = builder.build(PUBLIC | SUPER, "Example", Some("java/lang/Object"));

    let mut parsed = ClassFile::parse(&bytes).unwrap();
    let err = translate_class(&mut parsed, TranslatorSettings::default()).unwrap_err();
    assert_eq!(err.code(), "TR0c");
}

#[test]
fn lines_follow_the_line_number_table() {
    let mut builder = ClassBuilder::new();
    let code = &[
        0x03, // 0: iconst_0
        0x3b, // 1: istore_0
        0x1a, // 2: iload_0
        0xac, // 3: ireturn
    ];
    builder.method(PUBLIC | STATIC, "go", "()I", 1, 1, code, &[(0, 10), (2, 11)]);
    let bytes = builder.build(PUBLIC | SUPER, "Example", Some("java/lang/Object"));

    let mut parsed = ClassFile::parse(&bytes).unwrap();
    let methods = translate_class(&mut parsed, TranslatorSettings::default()).unwrap();
    let (_, _, code) = &methods[0];
    assert_eq!(code.lines(), vec![10, 10, 11, 11]);
}

#[test]
fn interface_must_be_abstract_and_not_final() {
    let builder = ClassBuilder::new();
    let bytes = builder.build(
        PUBLIC | INTERFACE | ABSTRACT | FINAL,
        "Broken",
        Some("java/lang/Object"),
    );
    let err = ClassFile::parse(&bytes).unwrap_err();
    assert_eq!(err.code(), "FL03");
}

#[test]
fn bad_magic_rejected() {
    let err = ClassFile::parse(&[0x00, 0x01, 0x02, 0x03]).unwrap_err();
    assert_eq!(err.code(), "CF01");
}

#[test]
fn methods_without_code_are_skipped_but_not_translatable() {
    let mut builder = ClassBuilder::new();
    builder.abstract_method(PUBLIC | ABSTRACT, "todo", "()V");
    let bytes = builder.build(
        PUBLIC | SUPER | ABSTRACT,
        "Example",
        Some("java/lang/Object"),
    );

    let mut parsed = ClassFile::parse(&bytes).unwrap();
    let methods = translate_class(&mut parsed, TranslatorSettings::default()).unwrap();
    assert!(methods.is_empty());

    let method = &parsed.class.methods[0];
    let err = MethodTranslator::new(
        &parsed.pool,
        &mut parsed.links,
        parsed.class.this_link,
        method,
        TranslatorSettings::default(),
    )
    .map(|_| ())
    .unwrap_err();
    assert_eq!(err.code(), "TR0b");
}
