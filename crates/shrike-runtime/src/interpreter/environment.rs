//! Environment chain for the classic back-end

use super::CValue;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// A shared, mutable environment frame
pub type Env = Rc<RefCell<Environment>>;

/// One lexical environment: name → value, chained to the enclosing one
#[derive(Debug, Default)]
pub struct Environment {
    values: HashMap<String, CValue>,
    enclosing: Option<Env>,
}

impl Environment {
    /// Create the global environment
    pub fn global() -> Env {
        Rc::new(RefCell::new(Environment::default()))
    }

    /// Create a child environment
    pub fn child(enclosing: &Env) -> Env {
        Rc::new(RefCell::new(Environment {
            values: HashMap::new(),
            enclosing: Some(Rc::clone(enclosing)),
        }))
    }

    /// Define (or redefine) a name in this frame
    pub fn define(&mut self, name: impl Into<String>, value: CValue) {
        self.values.insert(name.into(), value);
    }

    /// Look a name up through the chain
    pub fn get(env: &Env, name: &str) -> Option<CValue> {
        let borrowed = env.borrow();
        if let Some(value) = borrowed.values.get(name) {
            return Some(value.clone());
        }
        let enclosing = borrowed.enclosing.clone();
        drop(borrowed);
        enclosing.and_then(|e| Environment::get(&e, name))
    }

    /// Assign to an existing name through the chain; false when undefined
    pub fn assign(env: &Env, name: &str, value: CValue) -> bool {
        let mut borrowed = env.borrow_mut();
        if borrowed.values.contains_key(name) {
            borrowed.values.insert(name.to_string(), value);
            return true;
        }
        let enclosing = borrowed.enclosing.clone();
        drop(borrowed);
        match enclosing {
            Some(e) => Environment::assign(&e, name, value),
            None => false,
        }
    }

    /// True when the name is defined in this frame itself
    pub fn has_here(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Read a name from this frame only
    pub fn get_here(&self, name: &str) -> Option<CValue> {
        self.values.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_lookup_and_shadowing() {
        let global = Environment::global();
        global.borrow_mut().define("x", CValue::Int(1));

        let inner = Environment::child(&global);
        assert!(matches!(
            Environment::get(&inner, "x"),
            Some(CValue::Int(1))
        ));

        inner.borrow_mut().define("x", CValue::Int(2));
        assert!(matches!(
            Environment::get(&inner, "x"),
            Some(CValue::Int(2))
        ));
        assert!(matches!(
            Environment::get(&global, "x"),
            Some(CValue::Int(1))
        ));
    }

    #[test]
    fn test_assign_walks_outward() {
        let global = Environment::global();
        global.borrow_mut().define("x", CValue::Int(1));
        let inner = Environment::child(&global);

        assert!(Environment::assign(&inner, "x", CValue::Int(5)));
        assert!(matches!(
            Environment::get(&global, "x"),
            Some(CValue::Int(5))
        ));
        assert!(!Environment::assign(&inner, "missing", CValue::Nil));
    }
}
