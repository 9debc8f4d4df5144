use pyrite::bytecode::operand::VirtualRegister;
use pyrite::bytecode::register_allocator::RegisterAllocator;

#[test]
fn temporaries_are_reclaimed_from_the_tail() {
    let mut registers = RegisterAllocator::new();

    let t0 = registers.new_temporary().unwrap();
    assert_eq!(t0.local_index(), 0);

    // t0 is unreferenced, so the next temporary reuses its slot.
    let t1 = registers.new_temporary().unwrap();
    assert_eq!(t1.local_index(), 0);
}

#[test]
fn referenced_register_is_never_reused() {
    let mut registers = RegisterAllocator::new();

    let t0 = registers.new_temporary().unwrap();
    registers.retain(t0);

    let t1 = registers.new_temporary().unwrap();
    assert_eq!(t1.local_index(), 1);

    // Releasing makes the slot reclaimable again.
    registers.release(t0);
    let t2 = registers.new_temporary().unwrap();
    assert_eq!(t2.local_index(), 0);
}

#[test]
fn live_register_blocks_reclamation_of_registers_above_it() {
    let mut registers = RegisterAllocator::new();

    let t0 = registers.new_temporary().unwrap();
    registers.retain(t0);
    let t1 = registers.new_temporary().unwrap();
    registers.retain(t1);
    let t2 = registers.new_temporary().unwrap();
    registers.retain(t2);

    // t1 is dead but t2 above it is still live, so only indices past t2 are
    // handed out.
    registers.release(t1);
    let t3 = registers.new_temporary().unwrap();
    assert_eq!(t3.local_index(), 3);

    // Once t2 dies the trailing run t1..t3 is reclaimed.
    registers.release(t2);
    let t4 = registers.new_temporary().unwrap();
    assert_eq!(t4.local_index(), 1);

    let _ = t0;
}

#[test]
fn vars_are_permanent() {
    let mut registers = RegisterAllocator::new();

    let v0 = registers.add_var().unwrap();
    assert_eq!(v0.local_index(), 0);

    // A var slot is retained forever and never reclaimed by temporaries.
    let t0 = registers.new_temporary().unwrap();
    assert_eq!(t0.local_index(), 1);
    assert_eq!(registers.num_vars(), 1);
}

#[test]
fn high_water_mark_is_stack_aligned() {
    let mut registers = RegisterAllocator::new();

    let t0 = registers.new_temporary().unwrap();
    registers.retain(t0);
    assert_eq!(registers.num_callee_registers(), 2);

    let t1 = registers.new_temporary().unwrap();
    registers.retain(t1);
    let t2 = registers.new_temporary().unwrap();
    registers.retain(t2);
    assert_eq!(registers.num_callee_registers(), 4);

    // The high water mark never shrinks.
    registers.release(t2);
    registers.release(t1);
    registers.release(t0);
    registers.reclaim_free_registers();
    assert_eq!(registers.num_callee_registers(), 4);
    assert_eq!(registers.num_allocated(), 0);
}

#[test]
fn release_ignores_arguments_and_constants() {
    let mut registers = RegisterAllocator::new();

    // Argument and constant registers are not owned by the allocator.
    registers.retain(VirtualRegister::argument(2));
    registers.release(VirtualRegister::argument(2));
    registers.retain(VirtualRegister::constant(0));
    registers.release(VirtualRegister::constant(0));

    assert_eq!(registers.num_allocated(), 0);
}

#[test]
fn register_encoding_round_trips() {
    let local = VirtualRegister::local(7);
    assert!(local.is_local());
    assert_eq!(local.local_index(), 7);
    assert_eq!(VirtualRegister::decode(local.encode()), local);

    let argument = VirtualRegister::parameter(0);
    assert!(argument.is_argument());
    assert_eq!(argument.argument_index(), 1);

    assert!(VirtualRegister::this().is_this());
    assert!(!VirtualRegister::this().is_local());
    assert!(VirtualRegister::callee().is_callee());
    assert!(!VirtualRegister::callee().is_local());

    let constant = VirtualRegister::constant(3);
    assert!(constant.is_constant());
    assert_eq!(constant.constant_index(), 3);
}
