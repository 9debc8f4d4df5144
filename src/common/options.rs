/// Options passed throughout bytecode generation.
pub struct Options {
    /// Print the bytecode of each generated function to the console.
    pub print_bytecode: bool,
    /// Emit debugger hooks, which also forces every variable into a heap scope
    /// so the debugger can inspect and modify it.
    pub emit_debug_hooks: bool,
    /// Emit profiling hooks around calls.
    pub emit_profile_hooks: bool,
}

/// Builder for an Options struct.
pub struct OptionsBuilder {
    print_bytecode: bool,
    emit_debug_hooks: bool,
    emit_profile_hooks: bool,
}

impl OptionsBuilder {
    pub fn new() -> Self {
        Self {
            print_bytecode: false,
            emit_debug_hooks: false,
            emit_profile_hooks: false,
        }
    }

    pub fn print_bytecode(mut self, value: bool) -> Self {
        self.print_bytecode = value;
        self
    }

    pub fn emit_debug_hooks(mut self, value: bool) -> Self {
        self.emit_debug_hooks = value;
        self
    }

    pub fn emit_profile_hooks(mut self, value: bool) -> Self {
        self.emit_profile_hooks = value;
        self
    }

    pub fn build(self) -> Options {
        Options {
            print_bytecode: self.print_bytecode,
            emit_debug_hooks: self.emit_debug_hooks,
            emit_profile_hooks: self.emit_profile_hooks,
        }
    }
}
