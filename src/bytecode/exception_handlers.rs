use crate::debug_print::{DebugPrint, DebugPrinter};

/// What kind of handler covers an exception range.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum HandlerKind {
    /// A source-level catch clause.
    Catch,
    /// A synthesized handler: a finally block or an iterator close sequence.
    SynthesizedFinally,
}

/// One entry of a function's exception handler table.
#[derive(Clone, Copy)]
pub struct ExceptionHandler {
    /// Instruction index of the start of the covered range (inclusive).
    pub start: usize,
    /// Instruction index of the end of the covered range (exclusive).
    pub end: usize,
    /// Instruction index of the handler run when an exception occurs in the
    /// range.
    pub handler: usize,
    pub kind: HandlerKind,
}

pub struct ExceptionHandlersBuilder {
    handlers: Vec<ExceptionHandler>,
}

impl ExceptionHandlersBuilder {
    pub fn new() -> Self {
        Self { handlers: vec![] }
    }

    pub fn add(&mut self, handler: ExceptionHandler) {
        // Degenerate ranges must have been filtered by the caller.
        debug_assert!(handler.start < handler.end);
        self.handlers.push(handler);
    }

    pub fn finish(self) -> Option<ExceptionHandlers> {
        if self.handlers.is_empty() {
            return None;
        }

        Some(ExceptionHandlers { handlers: self.handlers })
    }
}

/// The finished exception handler table, ordered innermost first so the
/// interpreter takes the first matching range.
pub struct ExceptionHandlers {
    handlers: Vec<ExceptionHandler>,
}

impl ExceptionHandlers {
    pub fn iter(&self) -> impl Iterator<Item = &ExceptionHandler> {
        self.handlers.iter()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }
}

impl DebugPrint for ExceptionHandlers {
    fn debug_format(&self, printer: &mut DebugPrinter) {
        printer.write("Exception Handlers:\n");
        printer.inc_indent();

        for handler in self.iter() {
            printer.write_indent();
            printer.write(&format!(
                "{}-{} -> {} ({:?})\n",
                handler.start, handler.end, handler.handler, handler.kind
            ));
        }

        printer.dec_indent();
    }
}
