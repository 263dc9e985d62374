// Sequential — A chain of layers sharing one graph
//
// Sequential owns the Graph and the layers. `add` wires the previous layer's
// output 0 into the new layer's input 0, so consecutive layers share one edge
// and activations flow through without copies.
//
//   forward(inputs)        first layer's data slots <- inputs, then every
//                          layer in order; returns the last layer's outputs
//   backward(out_grads)    last layer's output gradients <- out_grads, then
//                          every layer in reverse order
//
// After `backward`, weight and bias gradients sit in each layer's weight/bias
// edges and `input_gradient` returns the gradient w.r.t. the network input.

use litchi_core::error::{Error, Result};
use litchi_core::graph::{Graph, VectorType};
use litchi_core::random::DEFAULT_SEED;
use litchi_core::tensor::{Tensor, Vector};

use crate::layer::{self, Layer};

/// An ordered stack of layers evaluated one after another.
#[derive(Debug)]
pub struct Sequential {
    graph: Graph,
    layers: Vec<Layer>,
    batch: usize,
}

impl Default for Sequential {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}

impl Sequential {
    /// An empty chain whose graph is seeded with `seed`.
    pub fn new(seed: u64) -> Self {
        Sequential {
            graph: Graph::with_seed(seed),
            layers: Vec::new(),
            batch: 0,
        }
    }

    /// Append a layer, connecting it to the current last layer.
    pub fn add(mut self, mut layer: Layer) -> Result<Self> {
        if let Some(last) = self.layers.last_mut() {
            layer::connect(&mut self.graph, last, &mut layer, 0, 0)?;
        }
        self.layers.push(layer);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    /// Set up every layer; see [`Layer::setup`].
    pub fn setup(&mut self, reset_weight: bool) -> Result<()> {
        for layer in self.layers.iter_mut() {
            layer.setup(&mut self.graph, reset_weight)?;
        }
        Ok(())
    }

    /// Run `inputs` through every layer and return the last layer's data
    /// outputs, trimmed to the batch size.
    pub fn forward(&mut self, inputs: &[Tensor]) -> Result<Vec<&[Vector]>> {
        if self.layers.is_empty() {
            return Err(Error::msg("forward on an empty Sequential"));
        }
        self.setup(false)?;

        let samples = self.layers[0].stage_inputs(&mut self.graph, inputs)?;
        for layer in self.layers.iter_mut() {
            layer.forward(&mut self.graph)?;
        }
        self.batch = samples;

        let last = self
            .layers
            .last_mut()
            .ok_or_else(|| Error::msg("forward on an empty Sequential"))?;
        last.data_outputs(&mut self.graph, samples)
    }

    /// Back-propagate `output_grads` (one tensor per data output of the last
    /// layer) through every layer.
    pub fn backward(&mut self, output_grads: &[Tensor]) -> Result<()> {
        let last = self
            .layers
            .last_mut()
            .ok_or_else(|| Error::msg("backward on an empty Sequential"))?;

        let slots: Vec<usize> = (0..last.out_channels())
            .filter(|&i| last.out_types()[i] == VectorType::Data)
            .collect();
        if slots.len() != output_grads.len() {
            return Err(Error::InputCountMismatch {
                expected: slots.len(),
                got: output_grads.len(),
            });
        }
        for (&slot, grad) in slots.iter().zip(output_grads) {
            let id = last.ith_out_node(&mut self.graph, slot)?;
            self.graph.edge_mut(id)?.write_gradient(grad)?;
        }

        for layer in self.layers.iter_mut().rev() {
            layer.backward(&mut self.graph)?;
        }
        Ok(())
    }

    /// Gradient w.r.t. the first layer's data input, trimmed to the batch size
    /// of the last forward pass.
    pub fn input_gradient(&self) -> Result<&[Vector]> {
        let first = self
            .layers
            .first()
            .ok_or_else(|| Error::msg("input_gradient on an empty Sequential"))?;
        let id = first
            .in_edge(0)
            .ok_or_else(|| Error::msg("input_gradient before forward"))?;
        let grad = self.graph.edge(id)?.gradient();
        Ok(&grad[..self.batch.min(grad.len())])
    }
}
