mod assembler;

pub use assembler::SnapshotAssembler;
