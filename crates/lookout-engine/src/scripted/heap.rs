//! Object storage for the scripted engine.
//!
//! Handles are indices into a never-shrinking vector, so every handle
//! stays valid for the life of the engine.

use std::sync::Arc;

use crate::debugger::ScriptId;
use crate::engine::HostFunction;
use crate::error::EngineError;
use crate::scripted::parser::{Expr, FunctionDecl};
use crate::value::{ObjectKind, ObjectRef, Value};

pub(crate) const GLOBAL_HANDLE: u64 = 0;
pub(crate) const OBJECT_PROTOTYPE_HANDLE: u64 = 1;

/// What runs when a function object is called.
#[derive(Clone)]
pub(crate) enum Callable {
    Host(HostFunction),
    /// `function (params) { return body }`
    Literal { params: Vec<String>, body: Arc<Expr> },
    /// A `function name() {` block of some script.
    Declared {
        file_id: ScriptId,
        decl: Arc<FunctionDecl>,
    },
}

pub(crate) struct HeapObject {
    pub kind: ObjectKind,
    pub class_name: String,
    /// Function name, or error message for error objects.
    pub label: String,
    pub properties: Vec<(String, Value)>,
    pub prototype: Value,
    pub callable: Option<Callable>,
}

impl HeapObject {
    pub fn plain(prototype: Value) -> Self {
        Self {
            kind: ObjectKind::Plain,
            class_name: "Object".into(),
            label: String::new(),
            properties: Vec::new(),
            prototype,
            callable: None,
        }
    }

    fn description(&self) -> String {
        match self.kind {
            ObjectKind::Array => {
                let len = self
                    .properties
                    .iter()
                    .filter(|(k, _)| k.parse::<usize>().is_ok())
                    .count();
                format!("Array({len})")
            }
            ObjectKind::Function => match &self.callable {
                Some(Callable::Host(_)) => {
                    format!("function {}() {{ [native code] }}", self.label)
                }
                Some(Callable::Declared { decl, .. }) => {
                    format!("function {}({}) {{ ... }}", decl.name, decl.params.join(", "))
                }
                _ => format!("function {}() {{ ... }}", self.label),
            },
            ObjectKind::Error => {
                if self.label.is_empty() {
                    "Error".to_string()
                } else {
                    format!("Error: {}", self.label)
                }
            }
            _ => self.class_name.clone(),
        }
    }
}

#[derive(Default)]
pub(crate) struct Heap {
    objects: Vec<HeapObject>,
}

impl Heap {
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn alloc(&mut self, object: HeapObject) -> ObjectRef {
        self.objects.push(object);
        let handle = self.objects.len() as u64 - 1;
        self.reference(handle)
            .unwrap_or_else(|_| ObjectRef::new(handle, ObjectKind::Plain, "Object", "Object"))
    }

    /// Fresh [`ObjectRef`] reflecting the object's current shape.
    pub fn reference(&self, handle: u64) -> Result<ObjectRef, EngineError> {
        let object = self.get(handle)?;
        Ok(ObjectRef::new(
            handle,
            object.kind,
            object.class_name.clone(),
            object.description(),
        ))
    }

    pub fn get(&self, handle: u64) -> Result<&HeapObject, EngineError> {
        self.objects
            .get(handle as usize)
            .ok_or(EngineError::InvalidHandle(handle))
    }

    pub fn get_mut(&mut self, handle: u64) -> Result<&mut HeapObject, EngineError> {
        self.objects
            .get_mut(handle as usize)
            .ok_or(EngineError::InvalidHandle(handle))
    }

    /// Property lookup along the prototype chain.
    pub fn lookup(&self, handle: u64, name: &str) -> Result<Option<Value>, EngineError> {
        let mut current = handle;
        // Chains are short; the bound only guards against accidental cycles.
        for _ in 0..64 {
            let object = self.get(current)?;
            if let Some((_, value)) = object.properties.iter().find(|(k, _)| k == name) {
                return Ok(Some(value.clone()));
            }
            match &object.prototype {
                Value::Object(proto) => current = proto.handle(),
                _ => return Ok(None),
            }
        }
        Ok(None)
    }

    pub fn set(&mut self, handle: u64, name: &str, value: Value) -> Result<(), EngineError> {
        let object = self.get_mut(handle)?;
        match object.properties.iter_mut().find(|(k, _)| k == name) {
            Some(slot) => slot.1 = value,
            None => object.properties.push((name.to_string(), value)),
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &HeapObject)> {
        self.objects
            .iter()
            .enumerate()
            .map(|(i, object)| (i as u64, object))
    }
}
