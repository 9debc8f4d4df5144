use super::instruction::OpCode;

/// Appends instructions to the linear output stream.
///
/// The stream is a sequence of i32 words: one opcode word followed by that
/// opcode's operand words. The writer tracks the most recently emitted opcode
/// so the generator can fuse or retract it; retraction shrinks the stream by
/// the exact encoded length of the retracted instruction.
pub struct BytecodeWriter {
    words: Vec<i32>,
    last_opcode: OpCode,
    last_instruction_start: usize,
}

impl BytecodeWriter {
    pub fn new() -> Self {
        Self {
            words: Vec::new(),
            // The End sentinel also marks "no fusable previous instruction".
            last_opcode: OpCode::End,
            last_instruction_start: 0,
        }
    }

    pub fn finish(self) -> Vec<i32> {
        self.words
    }

    /// Index of the next word to be written.
    pub fn current_index(&self) -> usize {
        self.words.len()
    }

    pub fn last_opcode(&self) -> OpCode {
        self.last_opcode
    }

    /// Disable peephole fusion of the previous instruction, e.g. because the
    /// current position is a jump target.
    pub fn kill_last_opcode(&mut self) {
        self.last_opcode = OpCode::End;
    }

    /// Begin a new instruction. In debug builds verifies that the previously
    /// emitted instruction's declared length matches the actual stream growth,
    /// which catches malformed emission sequences.
    pub fn start_instruction(&mut self, opcode: OpCode) {
        debug_assert!(
            self.last_opcode == OpCode::End
                || self.words.len() - self.last_instruction_start == self.last_opcode.length()
        );

        self.last_instruction_start = self.words.len();
        self.last_opcode = opcode;
        self.words.push(opcode as i32);
    }

    pub fn push_word(&mut self, word: i32) {
        self.words.push(word);
    }

    pub fn set_word(&mut self, index: usize, word: i32) {
        self.words[index] = word;
    }

    pub fn word_at(&self, index: usize) -> i32 {
        self.words[index]
    }

    /// Operands (dst, src1, src2) of the last emitted three-operand
    /// instruction.
    pub fn retrieve_last_binary_op(&self) -> (i32, i32, i32) {
        debug_assert!(self.words.len() >= 4);
        let len = self.words.len();
        (self.words[len - 3], self.words[len - 2], self.words[len - 1])
    }

    /// Operands (dst, src) of the last emitted two-operand instruction.
    pub fn retrieve_last_unary_op(&self) -> (i32, i32) {
        debug_assert!(self.words.len() >= 3);
        let len = self.words.len();
        (self.words[len - 2], self.words[len - 1])
    }

    /// Retract the last emitted three-operand instruction, shrinking the
    /// stream by its exact encoded length.
    pub fn rewind_binary_op(&mut self) {
        debug_assert!(self.words.len() - self.last_instruction_start == 4);
        let new_len = self.words.len() - 4;
        self.words.truncate(new_len);
        self.last_opcode = OpCode::End;
    }

    /// Retract the last emitted two-operand instruction.
    pub fn rewind_unary_op(&mut self) {
        debug_assert!(self.words.len() - self.last_instruction_start == 3);
        let new_len = self.words.len() - 3;
        self.words.truncate(new_len);
        self.last_opcode = OpCode::End;
    }

    pub fn words(&self) -> &[i32] {
        &self.words
    }
}
