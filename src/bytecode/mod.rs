pub mod constant_table;
pub mod exception_handlers;
pub mod function;
pub mod generator;
pub mod instruction;
pub mod jump_tables;
pub mod label;
pub mod operand;
pub mod register_allocator;
pub mod symbol_table;
pub mod writer;
