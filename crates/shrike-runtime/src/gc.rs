//! Mark-and-sweep garbage collector
//!
//! Tri-color over the arena: unmarked entries are white, the gray stack
//! holds marked-but-untraced ids, and a popped-and-traced object is black.
//! After marking, no black object references a white one; sweep frees the
//! remaining white entries and clears the mark bit on survivors. The string
//! intern table is swept symmetrically so dead interns do not pin content.

use crate::heap::Heap;
use crate::object::{Object, ObjectId};
use crate::value::Value;
use std::collections::{BTreeMap, HashMap};

/// Everything outside the heap that keeps objects alive
pub struct GcRoots<'a> {
    /// The VM value stack
    pub stack: &'a [Value],
    /// Closure of every active call frame
    pub frame_closures: &'a [ObjectId],
    /// Open upvalue objects, keyed by stack slot
    pub open_upvalues: &'a BTreeMap<usize, ObjectId>,
    /// The globals table
    pub globals: &'a HashMap<String, Value>,
}

impl<'a> GcRoots<'a> {
    /// Roots for a collection outside any VM run (compilation time)
    pub fn compile_time(globals: &'a HashMap<String, Value>) -> Self {
        const NO_STACK: &[Value] = &[];
        const NO_FRAMES: &[ObjectId] = &[];
        static EMPTY_UPVALUES: BTreeMap<usize, ObjectId> = BTreeMap::new();
        Self {
            stack: NO_STACK,
            frame_closures: NO_FRAMES,
            open_upvalues: &EMPTY_UPVALUES,
            globals,
        }
    }
}

/// Run one full collection cycle
pub fn collect(heap: &mut Heap, roots: &GcRoots<'_>) {
    let mut gray: Vec<ObjectId> = Vec::new();

    mark_roots(heap, roots, &mut gray);
    trace_references(heap, &mut gray);
    sweep(heap);

    heap.rearm_threshold();
}

fn mark_roots(heap: &mut Heap, roots: &GcRoots<'_>, gray: &mut Vec<ObjectId>) {
    for value in roots.stack {
        mark_value(heap, *value, gray);
    }
    for closure in roots.frame_closures {
        mark_object(heap, *closure, gray);
    }
    for upvalue in roots.open_upvalues.values() {
        mark_object(heap, *upvalue, gray);
    }
    for value in roots.globals.values() {
        mark_value(heap, *value, gray);
    }
    // Compile-time roots: objects held by an in-flight code generator.
    let compiler_roots = heap.compiler_roots.clone();
    for value in compiler_roots {
        mark_value(heap, value, gray);
    }
}

fn mark_value(heap: &mut Heap, value: Value, gray: &mut Vec<ObjectId>) {
    if let Value::Obj(id) = value {
        mark_object(heap, id, gray);
    }
}

fn mark_object(heap: &mut Heap, id: ObjectId, gray: &mut Vec<ObjectId>) {
    let entry = match heap.entries[id.0 as usize].as_mut() {
        Some(entry) => entry,
        None => return,
    };
    // The mark bit prevents re-enqueueing; blacken runs once per cycle.
    if entry.marked {
        return;
    }
    entry.marked = true;
    gray.push(id);
}

fn trace_references(heap: &mut Heap, gray: &mut Vec<ObjectId>) {
    while let Some(id) = gray.pop() {
        blacken(heap, id, gray);
    }
}

/// Enqueue every object `id` references
fn blacken(heap: &mut Heap, id: ObjectId, gray: &mut Vec<ObjectId>) {
    let mut values: Vec<Value> = Vec::new();
    let mut ids: Vec<ObjectId> = Vec::new();

    match heap.get(id) {
        Object::String(_) | Object::Native(_) => {}
        Object::Function(f) => {
            values.extend(f.chunk.constants.iter().copied());
        }
        Object::Closure(c) => {
            ids.push(c.function);
            ids.extend(c.upvalues.iter().copied());
        }
        Object::Upvalue(upvalue) => {
            if let crate::object::UpvalueObject::Closed(v) = upvalue {
                values.push(*v);
            }
        }
        Object::Class(c) => {
            ids.extend(c.methods.values().copied());
            ids.extend(c.supers.iter().copied());
        }
        Object::Instance(i) => {
            ids.push(i.class);
            values.extend(i.fields.iter().copied());
        }
        Object::BoundMethod(b) => {
            values.push(b.receiver);
            ids.push(b.method);
        }
        Object::List(items) => {
            values.extend(items.iter().copied());
        }
        Object::Map(entries) => {
            for (k, v) in entries {
                values.push(*k);
                values.push(*v);
            }
        }
    }

    for value in values {
        mark_value(heap, value, gray);
    }
    for child in ids {
        mark_object(heap, child, gray);
    }
}

fn sweep(heap: &mut Heap) {
    // Intern table first, while the mark bits are still set.
    let entries = &heap.entries;
    heap.strings.retain(|_, id| {
        entries[id.0 as usize]
            .as_ref()
            .map(|e| e.marked)
            .unwrap_or(false)
    });

    for (index, slot) in heap.entries.iter_mut().enumerate() {
        match slot {
            Some(entry) if entry.marked => {
                entry.marked = false;
            }
            Some(entry) => {
                heap.bytes_allocated = heap
                    .bytes_allocated
                    .saturating_sub(entry.object.heap_size());
                *slot = None;
                heap.free.push(index as u32);
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{ClosureObject, FunctionObject, Object};
    use crate::symbol::FunctionId;
    use std::rc::Rc;

    fn roots_with(globals: &HashMap<String, Value>) -> GcRoots<'_> {
        GcRoots::compile_time(globals)
    }

    #[test]
    fn test_unreachable_objects_are_freed() {
        let mut heap = Heap::new();
        let live = heap.allocate(Object::List(vec![Value::Int(1)]));
        let dead = heap.allocate(Object::List(vec![Value::Int(2)]));

        let mut globals = HashMap::new();
        globals.insert("keep".to_string(), Value::Obj(live));

        collect(&mut heap, &roots_with(&globals));

        assert!(heap.is_live(live));
        assert!(!heap.is_live(dead));
    }

    #[test]
    fn test_marks_are_cleared_on_survivors() {
        let mut heap = Heap::new();
        let live = heap.allocate(Object::List(Vec::new()));
        let mut globals = HashMap::new();
        globals.insert("keep".to_string(), Value::Obj(live));

        collect(&mut heap, &roots_with(&globals));
        collect(&mut heap, &roots_with(&globals));
        assert!(heap.is_live(live));
    }

    #[test]
    fn test_reachability_is_transitive() {
        let mut heap = Heap::new();
        let inner = heap.allocate(Object::List(vec![Value::Int(3)]));
        let outer = heap.allocate(Object::List(vec![Value::Obj(inner)]));

        let mut globals = HashMap::new();
        globals.insert("keep".to_string(), Value::Obj(outer));

        collect(&mut heap, &roots_with(&globals));
        assert!(heap.is_live(inner));
        assert!(heap.is_live(outer));
    }

    #[test]
    fn test_closure_traces_function_and_constants() {
        let mut heap = Heap::new();
        let constant = heap.intern("kept by a chunk constant");
        let mut chunk = crate::bytecode::Chunk::new(Rc::from("t"));
        chunk.add_constant(Value::Obj(constant)).unwrap();
        let function = heap.allocate(Object::Function(FunctionObject {
            name: "f".into(),
            arity: 0,
            upvalue_count: 0,
            chunk: Rc::new(chunk),
            is_initializer: false,
            function_id: FunctionId(0),
        }));
        let closure = heap.allocate(Object::Closure(ClosureObject {
            function,
            upvalues: Vec::new(),
        }));

        let mut globals = HashMap::new();
        globals.insert("f".to_string(), Value::Obj(closure));

        collect(&mut heap, &roots_with(&globals));
        assert!(heap.is_live(constant));
        assert!(heap.is_live(function));
    }

    #[test]
    fn test_intern_table_is_swept() {
        let mut heap = Heap::new();
        let dead = heap.intern("nobody references this");
        let globals = HashMap::new();

        collect(&mut heap, &roots_with(&globals));
        assert!(!heap.is_live(dead));

        // Re-interning after the sweep produces a fresh object.
        let again = heap.intern("nobody references this");
        assert!(heap.is_live(again));
    }

    #[test]
    fn test_compiler_roots_survive() {
        let mut heap = Heap::new();
        let pinned = heap.intern("in-flight constant");
        heap.compiler_roots.push(Value::Obj(pinned));

        let globals = HashMap::new();
        collect(&mut heap, &roots_with(&globals));
        assert!(heap.is_live(pinned));
    }
}
