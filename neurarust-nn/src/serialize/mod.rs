//! Serialized form of module graphs.
//!
//! Every module saves itself into a [`ModuleNode`]: a type tag, scalar
//! options, named tensors, and child nodes in order. Nodes serialize with
//! serde, so any serde format works; JSON helpers are provided. Loading goes
//! through a [`ModuleRegistry`], which maps type tags to loader functions.

mod registry;

pub use registry::{LoaderFn, ModuleRegistry};

use crate::module::Module;
use neurarust_tensor::{NeuraNumeric, NeuraRustError, Tensor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A tensor widened to `f64` for storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorRecord {
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
}

impl TensorRecord {
    pub fn from_tensor<T: NeuraNumeric>(tensor: &Tensor<T>) -> Self {
        TensorRecord {
            shape: tensor.shape().to_vec(),
            data: tensor.to_f64_vec(),
        }
    }

    pub fn to_tensor<T: NeuraNumeric>(&self) -> Result<Tensor<T>, NeuraRustError> {
        Tensor::from_f64(&self.data, self.shape.clone())
            .map_err(|e| NeuraRustError::SerializationError(format!("malformed tensor record: {}", e)))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModuleNode {
    pub kind: String,
    #[serde(default)]
    pub attrs: BTreeMap<String, f64>,
    #[serde(default)]
    pub tensors: BTreeMap<String, TensorRecord>,
    #[serde(default)]
    pub children: Vec<ModuleNode>,
}

impl ModuleNode {
    pub fn new(kind: &str) -> Self {
        ModuleNode {
            kind: kind.to_string(),
            ..Default::default()
        }
    }

    pub fn with_attr(mut self, name: &str, value: f64) -> Self {
        self.attrs.insert(name.to_string(), value);
        self
    }

    pub fn with_tensor<T: NeuraNumeric>(mut self, name: &str, tensor: &Tensor<T>) -> Self {
        self.tensors.insert(name.to_string(), TensorRecord::from_tensor(tensor));
        self
    }

    pub fn with_child(mut self, child: ModuleNode) -> Self {
        self.children.push(child);
        self
    }

    /// Fails unless this node carries the tag `kind`.
    pub fn expect_kind(&self, kind: &str) -> Result<(), NeuraRustError> {
        if self.kind != kind {
            return Err(NeuraRustError::SerializationError(format!(
                "expected a '{}' node, found '{}'",
                kind, self.kind
            )));
        }
        Ok(())
    }

    pub fn attr(&self, name: &str) -> Result<f64, NeuraRustError> {
        self.attrs.get(name).copied().ok_or_else(|| {
            NeuraRustError::SerializationError(format!("'{}' node is missing attribute '{}'", self.kind, name))
        })
    }

    pub fn attr_or(&self, name: &str, default: f64) -> f64 {
        self.attrs.get(name).copied().unwrap_or(default)
    }

    /// Reads a non-negative integral attribute.
    pub fn attr_usize(&self, name: &str) -> Result<usize, NeuraRustError> {
        let value = self.attr(name)?;
        if value < 0.0 || value.fract() != 0.0 {
            return Err(NeuraRustError::SerializationError(format!(
                "attribute '{}' of '{}' must be a non-negative integer, got {}",
                name, self.kind, value
            )));
        }
        Ok(value as usize)
    }

    pub fn tensor<T: NeuraNumeric>(&self, name: &str) -> Result<Tensor<T>, NeuraRustError> {
        self.tensors
            .get(name)
            .ok_or_else(|| {
                NeuraRustError::SerializationError(format!("'{}' node is missing tensor '{}'", self.kind, name))
            })?
            .to_tensor()
    }

    pub fn child(&self, index: usize) -> Result<&ModuleNode, NeuraRustError> {
        self.children.get(index).ok_or_else(|| {
            NeuraRustError::SerializationError(format!("'{}' node is missing child {}", self.kind, index))
        })
    }

    /// Fails unless the node has exactly `count` children.
    pub fn expect_children(&self, count: usize) -> Result<(), NeuraRustError> {
        if self.children.len() != count {
            return Err(NeuraRustError::SerializationError(format!(
                "'{}' node needs {} children, found {}",
                self.kind,
                count,
                self.children.len()
            )));
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, NeuraRustError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, NeuraRustError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Saves `module` as a JSON document.
pub fn to_json<T: NeuraNumeric>(module: &dyn Module<T>) -> Result<String, NeuraRustError> {
    module.save()?.to_json()
}

/// Rebuilds a module graph from a JSON document.
pub fn from_json<T: NeuraNumeric>(
    json: &str,
    registry: &ModuleRegistry<T>,
) -> Result<Box<dyn Module<T>>, NeuraRustError> {
    registry.load(&ModuleNode::from_json(json)?)
}

#[cfg(test)]
#[path = "serialize_test.rs"]
mod tests;
