//! Ready-made programs
//!
//! Every fixture has an entry method `Main.run` and enough method bodies for
//! the reference interpreter to execute it. Methods without a body are
//! treated as leaves that only record themselves in the trace.

use crate::interpreter::RuntimeValue;
use crate::program::TestProgram;
use rebind_core::ir::{IrBuilder, ValueId};
use rebind_core::{ClassType, DispatchKind, HierarchyBuilder, MethodRef, Nullability, TypeElement, TypeName};

fn entry_program(builder: HierarchyBuilder) -> TestProgram {
    let hierarchy = builder.build();
    let entry = hierarchy
        .method_ref("Main", "run")
        .unwrap_or_else(|| panic!("fixture hierarchy lacks Main.run"));
    TestProgram::new(hierarchy, entry)
}

fn receiver(builder: &mut IrBuilder, class: TypeName) -> ValueId {
    builder.argument(TypeElement::from_class(class, Nullability::DefinitelyNotNull))
}

/// `I.foo` called on a receiver typed `I` whose runtime class is known to
/// be exactly `H`. `G` also implements `I`, so the static type alone does
/// not decide the target.
fn interface_with_two_implementors() -> HierarchyBuilder {
    let mut b = HierarchyBuilder::new();
    b.interface("I").abstract_method("foo").abstract_method("bar").finish();
    b.class("H").implements("I").method("foo").method("bar").finish();
    b.class("G").implements("I").method("foo").method("bar").finish();
    b.class("Main").method("run").finish();
    b
}

fn dynamically_exact(program: &TestProgram, builder: &mut IrBuilder, class: &str) -> ValueId {
    let i = program.class("I");
    let exact = program.class(class);
    let value = builder.argument(TypeElement::from_class(i, Nullability::MaybeNull));
    builder.set_dynamic_type(value, ClassType::exact(exact, Nullability::MaybeNull));
    value
}

/// Interface `I` with the single implementor `A`, called on a fresh `A`
pub fn exact_receiver_interface_call() -> TestProgram {
    let mut b = HierarchyBuilder::new();
    b.interface("I").abstract_method("foo").finish();
    b.class("A").implements("I").method("foo").finish();
    b.class("Main").method("run").finish();
    let mut program = entry_program(b);

    let a = program.class("A");
    let mut builder = IrBuilder::new(program.entry.clone());
    let entry = builder.entry();
    let object = builder.block(entry).new_instance(a);
    builder
        .block(entry)
        .invoke(DispatchKind::Interface, program.method("I", "foo"), &[object]);
    builder.block(entry).ret(None);
    program.add_body(builder.finish());
    program
}

/// `A` and `B` both implement `I.foo`; the call site only knows `I`
pub fn ambiguous_interface_call() -> TestProgram {
    let mut b = HierarchyBuilder::new();
    b.interface("I").abstract_method("foo").finish();
    b.class("A").implements("I").method("foo").finish();
    b.class("B").implements("I").method("foo").finish();
    b.class("Main").method("run").finish();
    let mut program = entry_program(b);

    let i = program.class("I");
    let mut builder = IrBuilder::new(program.entry.clone());
    let object = builder.argument(TypeElement::from_class(i, Nullability::MaybeNull));
    let entry = builder.entry();
    builder
        .block(entry)
        .invoke(DispatchKind::Interface, program.method("I", "foo"), &[object]);
    builder.block(entry).ret(None);
    program.add_body(builder.finish());

    let runtime_class = program.class("B");
    program.with_arguments(vec![RuntimeValue::Object(runtime_class)])
}

fn chain_hierarchy() -> HierarchyBuilder {
    let mut b = HierarchyBuilder::new();
    b.class("A").method("foo").method("bar").finish();
    b.class("B").extends("A").method("foo").method("bar").finish();
    b.class("C").extends("B").method("foo").method("bar").finish();
    b
}

/// Body of `holder.name` that makes a super call to `parent.name` on `this`
fn add_super_body(program: &mut TestProgram, holder: &str, parent: &str, name: &str) {
    let method = program.method(holder, name);
    let target = program.method(parent, name);
    let class = program.class(holder);
    let mut builder = IrBuilder::new(method);
    let this = receiver(&mut builder, class);
    let entry = builder.entry();
    builder.block(entry).invoke(DispatchKind::Super, target, &[this]);
    builder.block(entry).ret(None);
    program.add_body(builder.finish());
}

/// `C extends B extends A`, each overriding `foo` and `bar` and calling
/// up with a super call. `Main.run` calls both on a fresh `C`.
pub fn super_chain() -> TestProgram {
    let mut b = chain_hierarchy();
    b.class("Main").method("run").finish();
    let mut program = entry_program(b);

    for name in ["foo", "bar"] {
        add_super_body(&mut program, "C", "B", name);
        add_super_body(&mut program, "B", "A", name);
    }

    let c = program.class("C");
    let mut builder = IrBuilder::new(program.entry.clone());
    let entry = builder.entry();
    let object = builder.block(entry).new_instance(c);
    for name in ["foo", "bar"] {
        builder
            .block(entry)
            .invoke(DispatchKind::Virtual, program.method("A", name), &[object]);
    }
    builder.block(entry).ret(None);
    program.add_body(builder.finish());
    program
}

/// `D extends B` inherits `bar`, so `D.baz`'s super call to `B.bar`
/// reaches the same method plain virtual dispatch would
pub fn inherited_super_call() -> TestProgram {
    let mut b = chain_hierarchy();
    b.class("D").extends("B").method("baz").finish();
    b.class("Main").method("run").finish();
    let mut program = entry_program(b);

    let d = program.class("D");
    let mut builder = IrBuilder::new(program.method("D", "baz"));
    let this = receiver(&mut builder, d);
    let entry = builder.entry();
    builder
        .block(entry)
        .invoke(DispatchKind::Super, program.method("B", "bar"), &[this]);
    builder.block(entry).ret(None);
    program.add_body(builder.finish());

    add_super_body(&mut program, "B", "A", "bar");

    let mut builder = IrBuilder::new(program.entry.clone());
    let entry = builder.entry();
    let object = builder.block(entry).new_instance(d);
    builder
        .block(entry)
        .invoke(DispatchKind::Virtual, program.method("D", "baz"), &[object]);
    builder.block(entry).ret(None);
    program.add_body(builder.finish());
    program
}

/// Abstract `B extends A` re-declares `foo`, concrete `C extends B`
/// implements it. `Main.run` calls `A.foo` on a fresh `C`.
pub fn abstract_in_middle() -> TestProgram {
    let mut b = HierarchyBuilder::new();
    b.class("A").method("foo").finish();
    b.class("B").extends("A").abstract_class().abstract_method("foo").finish();
    b.class("C").extends("B").method("foo").finish();
    b.class("Main").method("run").finish();
    let mut program = entry_program(b);

    let c = program.class("C");
    let mut builder = IrBuilder::new(program.entry.clone());
    let entry = builder.entry();
    let object = builder.block(entry).new_instance(c);
    builder
        .block(entry)
        .invoke(DispatchKind::Virtual, program.method("A", "foo"), &[object]);
    builder.block(entry).ret(None);
    program.add_body(builder.finish());
    program
}

fn repeated_calls(local_name: Option<&str>) -> TestProgram {
    let mut program = entry_program(interface_with_two_implementors());

    let mut builder = IrBuilder::new(program.entry.clone());
    let object = dynamically_exact(&program, &mut builder, "H");
    if let Some(name) = local_name {
        builder.set_local_info(object, name);
    }
    let entry = builder.entry();
    for _ in 0..2 {
        builder
            .block(entry)
            .invoke(DispatchKind::Interface, program.method("I", "foo"), &[object]);
    }
    builder.block(entry).ret(None);
    program.add_body(builder.finish());

    let h = program.class("H");
    program.with_arguments(vec![RuntimeValue::Object(h)])
}

/// Two interface calls in one block on the same receiver, both resolving
/// to `H.foo`
pub fn repeated_interface_calls() -> TestProgram {
    repeated_calls(None)
}

/// Same as [`repeated_interface_calls`], but the receiver is a named local
/// variable, so its other uses must not be renamed
pub fn repeated_calls_on_local() -> TestProgram {
    repeated_calls(Some("receiver"))
}

/// Interface call inside a block guarded by a catch-all handler
pub fn guarded_interface_call() -> TestProgram {
    let mut program = entry_program(interface_with_two_implementors());

    let mut builder = IrBuilder::new(program.entry.clone());
    let object = dynamically_exact(&program, &mut builder, "H");
    let entry = builder.entry();
    let guarded = builder.new_block();
    let handler = builder.new_block();
    let exit = builder.new_block();
    builder.block(entry).goto(guarded);
    builder.block(guarded).catch_all(handler);
    builder
        .block(guarded)
        .invoke(DispatchKind::Interface, program.method("I", "foo"), &[object]);
    builder.block(guarded).goto(exit);
    builder.block(handler).ret(None);
    builder.block(exit).ret(None);
    program.add_body(builder.finish());

    let h = program.class("H");
    program.with_arguments(vec![RuntimeValue::Object(h)])
}

/// Like [`guarded_interface_call`], but both the handler and the exit
/// return the receiver. Only the exit is reached after the call succeeds.
pub fn guarded_call_read_in_handler() -> TestProgram {
    let mut program = entry_program(interface_with_two_implementors());

    let mut builder = IrBuilder::new(program.entry.clone());
    let object = dynamically_exact(&program, &mut builder, "H");
    let entry = builder.entry();
    let guarded = builder.new_block();
    let handler = builder.new_block();
    let exit = builder.new_block();
    builder.block(entry).goto(guarded);
    builder.block(guarded).catch_all(handler);
    builder
        .block(guarded)
        .invoke(DispatchKind::Interface, program.method("I", "foo"), &[object]);
    builder.block(guarded).goto(exit);
    builder.block(handler).ret(Some(object));
    builder.block(exit).ret(Some(object));
    program.add_body(builder.finish());

    let h = program.class("H");
    program.with_arguments(vec![RuntimeValue::Object(h)])
}

/// Interface call, then an assume-non-null of the receiver, then a cast of
/// the assumed value back to `I`. The cast only narrows once the assumed
/// value has.
pub fn call_then_narrowing_chain() -> TestProgram {
    let mut program = entry_program(interface_with_two_implementors());

    let mut builder = IrBuilder::new(program.entry.clone());
    let object = dynamically_exact(&program, &mut builder, "H");
    let i = program.class("I");
    let entry = builder.entry();
    let call = builder
        .block(entry)
        .invoke(DispatchKind::Interface, program.method("I", "foo"), &[object]);
    let assumed = builder.block(entry).assume_non_null(object, Some(call));
    builder.block(entry).check_cast(assumed, i);
    builder.block(entry).ret(None);
    program.add_body(builder.finish());

    let h = program.class("H");
    program.with_arguments(vec![RuntimeValue::Object(h)])
}

/// Interface call followed by an assume-non-null of its receiver
pub fn call_then_assume_non_null() -> TestProgram {
    let mut program = entry_program(interface_with_two_implementors());

    let mut builder = IrBuilder::new(program.entry.clone());
    let object = dynamically_exact(&program, &mut builder, "H");
    let entry = builder.entry();
    let call = builder
        .block(entry)
        .invoke(DispatchKind::Interface, program.method("I", "foo"), &[object]);
    builder.block(entry).assume_non_null(object, Some(call));
    builder.block(entry).ret(None);
    program.add_body(builder.finish());

    let h = program.class("H");
    program.with_arguments(vec![RuntimeValue::Object(h)])
}

/// A call on one arm of a diamond and another after the merge. The cast
/// inserted on the arm does not dominate the merge.
pub fn diamond_interface_calls() -> TestProgram {
    let mut program = entry_program(interface_with_two_implementors());

    let mut builder = IrBuilder::new(program.entry.clone());
    let object = dynamically_exact(&program, &mut builder, "H");
    builder.set_local_info(object, "receiver");
    let entry = builder.entry();
    let left = builder.new_block();
    let right = builder.new_block();
    let join = builder.new_block();
    let foo = program.method("I", "foo");
    let condition = builder.block(entry).const_number(1);
    builder.block(entry).branch(condition, left, right);
    builder
        .block(left)
        .invoke(DispatchKind::Interface, foo.clone(), &[object]);
    builder.block(left).goto(join);
    builder.block(right).goto(join);
    builder.block(join).invoke(DispatchKind::Interface, foo, &[object]);
    builder.block(join).ret(None);
    program.add_body(builder.finish());

    let h = program.class("H");
    program.with_arguments(vec![RuntimeValue::Object(h)])
}

/// One long method with `call_sites` interface calls on the same
/// receiver, spread over a chain of blocks of which every third has a
/// catch handler. Used for benchmarks.
pub fn long_call_chain(implementors: usize, call_sites: usize) -> TestProgram {
    let mut b = HierarchyBuilder::new();
    b.interface("I").abstract_method("foo").finish();
    for i in 0..implementors.max(1) {
        b.class(&format!("Impl{i}")).implements("I").method("foo").finish();
    }
    b.class("Main").method("run").finish();
    let mut program = entry_program(b);

    let i = program.class("I");
    let target = program.class("Impl0");
    let foo: MethodRef = program.method("I", "foo");
    let mut builder = IrBuilder::new(program.entry.clone());
    let object = builder.argument(TypeElement::from_class(i, Nullability::MaybeNull));
    builder.set_dynamic_type(object, ClassType::exact(target, Nullability::MaybeNull));
    builder.set_local_info(object, "receiver");
    let handler = builder.new_block();
    builder.block(handler).ret(None);

    let mut current = builder.entry();
    for site in 0..call_sites {
        let next = builder.new_block();
        if site % 3 == 2 {
            builder.block(current).goto(next);
            current = next;
            let next = builder.new_block();
            builder.block(current).catch_all(handler);
            builder
                .block(current)
                .invoke(DispatchKind::Interface, foo.clone(), &[object]);
            builder.block(current).goto(next);
            current = next;
        } else {
            builder
                .block(current)
                .invoke(DispatchKind::Interface, foo.clone(), &[object]);
            builder.block(current).goto(next);
            current = next;
        }
    }
    builder.block(current).ret(None);
    program.add_body(builder.finish());

    program.with_arguments(vec![RuntimeValue::Object(target)])
}
