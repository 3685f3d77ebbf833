//! Native function registry
//!
//! Host functions are declared here with full signatures so the resolver
//! can typecheck and dispatch calls to them exactly like user overloads.
//! Both back-ends call through the same handler table.

use crate::heap::Heap;
use crate::object::{Object, ObjectId};
use crate::symbol::NativeId;
use crate::types::LoxType;
use crate::value::Value;
use std::time::{SystemTime, UNIX_EPOCH};

/// A host callable: takes the heap (for container access and allocation)
/// and the argument window, returns a value or an error message
pub type NativeHandler = fn(&mut Heap, &[Value]) -> Result<Value, String>;

/// One registered native overload
pub struct NativeFunction {
    /// Registry id
    pub id: NativeId,
    /// Script-visible name
    pub name: String,
    /// Declared arity
    pub arity: usize,
    /// Parameter types for overload dispatch
    pub params: Vec<LoxType>,
    /// Declared return type
    pub return_type: LoxType,
    /// Host implementation
    pub handler: NativeHandler,
}

/// The process-wide set of native functions
pub struct NativeManager {
    natives: Vec<NativeFunction>,
}

impl NativeManager {
    /// Create a manager with the built-in natives registered
    pub fn new() -> Self {
        let mut manager = Self {
            natives: Vec::new(),
        };
        manager.register("clock", vec![], LoxType::Floating, native_clock);
        manager.register(
            "len",
            vec![LoxType::String],
            LoxType::Integer,
            native_len,
        );
        manager.register(
            "len",
            vec![LoxType::List(std::rc::Rc::new(LoxType::Any))],
            LoxType::Integer,
            native_len,
        );
        manager.register(
            "len",
            vec![LoxType::Map(std::rc::Rc::new((LoxType::Any, LoxType::Any)))],
            LoxType::Integer,
            native_len,
        );
        manager
    }

    fn register(
        &mut self,
        name: &str,
        params: Vec<LoxType>,
        return_type: LoxType,
        handler: NativeHandler,
    ) -> NativeId {
        let id = NativeId(self.natives.len() as u32);
        self.natives.push(NativeFunction {
            id,
            name: name.to_string(),
            arity: params.len(),
            params,
            return_type,
            handler,
        });
        id
    }

    /// Look up a native by id
    pub fn get(&self, id: NativeId) -> &NativeFunction {
        &self.natives[id.0 as usize]
    }

    /// All overloads registered under `name`
    pub fn by_name(&self, name: &str) -> Vec<&NativeFunction> {
        self.natives.iter().filter(|n| n.name == name).collect()
    }

    /// Iterate every registered native
    pub fn iter(&self) -> impl Iterator<Item = &NativeFunction> {
        self.natives.iter()
    }

    /// The distinct names, in registration order (for seeding globals)
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for n in &self.natives {
            if !names.contains(&n.name.as_str()) {
                names.push(&n.name);
            }
        }
        names
    }
}

impl Default for NativeManager {
    fn default() -> Self {
        Self::new()
    }
}

fn native_clock(_heap: &mut Heap, _args: &[Value]) -> Result<Value, String> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| format!("clock() failed: {}", e))?;
    Ok(Value::Float(now.as_secs_f64()))
}

fn native_len(heap: &mut Heap, args: &[Value]) -> Result<Value, String> {
    let id: ObjectId = match args.first() {
        Some(Value::Obj(id)) => *id,
        _ => return Err("len() requires a string, list or map.".to_string()),
    };
    let length = match heap.get(id) {
        Object::String(s) => s.chars().count(),
        Object::List(items) => items.len(),
        Object::Map(entries) => entries.len(),
        _ => return Err("len() requires a string, list or map.".to_string()),
    };
    Ok(Value::Int(length as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_registered() {
        let manager = NativeManager::new();
        assert_eq!(manager.by_name("clock").len(), 1);
        assert_eq!(manager.by_name("len").len(), 3);
        assert_eq!(manager.names(), vec!["clock", "len"]);
    }

    #[test]
    fn test_len_on_containers() {
        let manager = NativeManager::new();
        let mut heap = Heap::new();
        let len = manager.by_name("len")[0];

        let s = heap.intern("abc");
        assert_eq!(
            (len.handler)(&mut heap, &[Value::Obj(s)]).unwrap(),
            Value::Int(3)
        );

        let list = heap.allocate(Object::List(vec![Value::Int(1), Value::Int(2)]));
        assert_eq!(
            (len.handler)(&mut heap, &[Value::Obj(list)]).unwrap(),
            Value::Int(2)
        );

        assert!((len.handler)(&mut heap, &[Value::Int(1)]).is_err());
    }

    #[test]
    fn test_clock_monotonicity() {
        let manager = NativeManager::new();
        let mut heap = Heap::new();
        let clock = manager.by_name("clock")[0];
        let a = (clock.handler)(&mut heap, &[]).unwrap();
        let b = (clock.handler)(&mut heap, &[]).unwrap();
        match (a, b) {
            (Value::Float(x), Value::Float(y)) => assert!(y >= x),
            _ => panic!("clock() must return floating"),
        }
    }
}
