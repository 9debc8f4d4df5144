use std::cell::RefCell;
use std::rc::Rc;

use super::interner::{Identifier, InternedStrings};
use super::options::{Options, OptionsBuilder};

/// Well known identifiers that the generator needs by name.
pub struct Names {
    pub this: Identifier,
    pub arguments: Identifier,
    pub iterator: Identifier,
    pub next: Identifier,
    pub return_: Identifier,
    pub done: Identifier,
    pub value: Identifier,
    pub undefined: Identifier,
    pub empty_string: Identifier,
}

impl Names {
    fn new(interner: &mut InternedStrings) -> Names {
        Names {
            this: interner.get("this"),
            arguments: interner.get("arguments"),
            iterator: interner.get("Symbol.iterator"),
            next: interner.get("next"),
            return_: interner.get("return"),
            done: interner.get("done"),
            value: interner.get("value"),
            undefined: interner.get("undefined"),
            empty_string: interner.get(""),
        }
    }
}

/// State shared by every compilation unit: the options and the process-wide
/// identifier interning table. Generators receive a context on construction
/// instead of reaching for global state.
pub struct Context {
    pub options: Rc<Options>,
    pub names: Names,
    interner: RefCell<InternedStrings>,
}

impl Context {
    pub fn new(options: Rc<Options>) -> Context {
        let mut interner = InternedStrings::new();
        let names = Names::new(&mut interner);

        Context { options, names, interner: RefCell::new(interner) }
    }

    pub fn intern(&self, value: &str) -> Identifier {
        self.interner.borrow_mut().get(value)
    }
}

/// Builder for a Context.
pub struct ContextBuilder {
    options: Option<Rc<Options>>,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self { options: None }
    }

    pub fn set_options(mut self, options: Rc<Options>) -> Self {
        self.options = Some(options);
        self
    }

    pub fn build(self) -> Context {
        let options = self
            .options
            .unwrap_or_else(|| Rc::new(OptionsBuilder::new().build()));
        Context::new(options)
    }
}
