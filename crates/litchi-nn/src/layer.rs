// Layer — The lifecycle every operator shares
//
// A Layer is a graph Node plus everything needed to run one operator: the
// operator's Params, the kernel built from them, the role (VectorType) of each
// slot, the weight/bias initializers, and the lifecycle flags.
//
// LIFECYCLE:
//
//   Uninitialized --setup--> WeightsReady --forward--> Computed
//
//   `setup(reset_weight = true)` is allowed from any state and always returns
//   to WeightsReady with freshly filled weights. `setup(false)` on a layer
//   that is already initialized touches nothing.
//
// BATCHES:
//
//   A forward call sizes everything from the first input edge: data tensors
//   and every gradient tensor grow to that many samples (never shrink), the
//   output gradients are zeroed, and the kernel runs. Weight and bias data
//   keep their single sample.
//
// VARIANTS:
//
//   The operator is selected by the Params tag (fully-connected or
//   activation). Shapes and constructors for each variant live in their own
//   modules; this file only knows how to dispatch on the tag.
//
// CALLING THE KERNEL:
//
//   Edge tensors live in the Graph arena. For one call the layer moves them
//   out of their edges, hands the kernel plain slices, and moves them back,
//   so kernels never see the graph and nothing is copied.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info, trace};

use litchi_core::backend::Backend;
use litchi_core::error::{Error, Result};
use litchi_core::graph::{EdgeId, Graph, Node, NodeId, VectorType};
use litchi_core::kernel::{
    KernelRegistry, OpKernel, OpKernelConstruction, OpKernelContext, OpKernelGradContext,
};
use litchi_core::params::Params;
use litchi_core::shape::Shape3D;
use litchi_core::tensor::{self, Tensor, Vector};

use crate::init::WeightInit;
use crate::{activation, fully_connected};

/// Where a layer is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerState {
    /// Constructed, weights never filled.
    Uninitialized,
    /// Set up; weights filled (or not trainable).
    WeightsReady,
    /// At least one forward pass has completed since setup.
    Computed,
}

/// One operator in the graph plus its lifecycle.
#[derive(Debug)]
pub struct Layer {
    node: Node,
    params: Arc<Params>,
    kernel: Box<dyn OpKernel>,
    in_types: Vec<VectorType>,
    out_types: Vec<VectorType>,
    weight_init: WeightInit,
    bias_init: WeightInit,
    fan_overrides: HashMap<usize, (usize, usize)>,
    trainable: bool,
    backend: Backend,
    initialized: bool,
    state: LayerState,
}

impl Layer {
    /// Create a layer with the built-in kernels.
    ///
    /// `in_types` / `out_types` fix the number and role of the slots. They are
    /// checked against the operator's declared shapes at `setup`, not here.
    pub fn new(
        params: Params,
        in_types: Vec<VectorType>,
        out_types: Vec<VectorType>,
        backend: Backend,
    ) -> Result<Self> {
        Self::with_registry(KernelRegistry::builtin(), params, in_types, out_types, backend)
    }

    /// Create a layer whose kernel comes from `registry`.
    pub fn with_registry(
        registry: &KernelRegistry,
        params: Params,
        in_types: Vec<VectorType>,
        out_types: Vec<VectorType>,
        backend: Backend,
    ) -> Result<Self> {
        let params = Arc::new(params);
        let kernel = registry.create(&OpKernelConstruction::new(Arc::clone(&params)), backend)?;
        Ok(Layer {
            node: Node::new(in_types.len(), out_types.len()),
            params,
            kernel,
            in_types,
            out_types,
            weight_init: WeightInit::xavier(),
            bias_init: WeightInit::constant(0.0),
            fan_overrides: HashMap::new(),
            trainable: true,
            backend,
            initialized: false,
            state: LayerState::Uninitialized,
        })
    }

    //  Builder setters

    /// Initializer for weight slots, used on the next (re)initialization.
    pub fn weight_init(mut self, init: WeightInit) -> Self {
        self.weight_init = init;
        self
    }

    /// Initializer for bias slots, used on the next (re)initialization.
    pub fn bias_init(mut self, init: WeightInit) -> Self {
        self.bias_init = init;
        self
    }

    /// Whether `init_weight` fills the trainable slots at all.
    pub fn trainable(mut self, trainable: bool) -> Self {
        self.trainable = trainable;
        self
    }

    /// Override fan-in / fan-out for input slot `slot`.
    pub fn fan(mut self, slot: usize, fan_in: usize, fan_out: usize) -> Self {
        self.fan_overrides.insert(slot, (fan_in, fan_out));
        self
    }

    //  Accessors

    pub fn id(&self) -> NodeId {
        self.node.id()
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn is_trainable(&self) -> bool {
        self.trainable
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn state(&self) -> LayerState {
        self.state
    }

    pub fn in_types(&self) -> &[VectorType] {
        &self.in_types
    }

    pub fn out_types(&self) -> &[VectorType] {
        &self.out_types
    }

    /// Number of input slots (data, weights, biases, ...).
    pub fn in_channels(&self) -> usize {
        self.in_types.len()
    }

    /// Number of output slots.
    pub fn out_channels(&self) -> usize {
        self.out_types.len()
    }

    /// Short name of the operator, e.g. "fully-connected" or "relu".
    pub fn layer_type(&self) -> String {
        match self.params.as_ref() {
            Params::FullyConnected(_) => "fully-connected".to_string(),
            Params::Activation(p) => p.function.to_string(),
        }
    }

    /// Declared shape of every input slot.
    pub fn in_shape(&self) -> Vec<Shape3D> {
        match self.params.as_ref() {
            Params::FullyConnected(p) => fully_connected::in_shape(p),
            Params::Activation(p) => activation::in_shape(p),
        }
    }

    /// Declared shape of every output slot.
    pub fn out_shape(&self) -> Vec<Shape3D> {
        match self.params.as_ref() {
            Params::FullyConnected(p) => fully_connected::out_shape(p),
            Params::Activation(p) => activation::out_shape(p),
        }
    }

    /// Fan-in used to initialize input slot `slot`.
    pub fn fan_in_size(&self, slot: usize) -> usize {
        match self.fan_overrides.get(&slot) {
            Some(&(fan_in, _)) => fan_in,
            None => self.in_shape().first().map_or(0, |s| s.width),
        }
    }

    /// Fan-out used to initialize input slot `slot`.
    pub fn fan_out_size(&self, slot: usize) -> usize {
        match self.fan_overrides.get(&slot) {
            Some(&(_, fan_out)) => fan_out,
            None => self.out_shape().first().map_or(0, |s| s.width),
        }
    }

    /// Edge currently in input slot `i`, if any.
    pub fn in_edge(&self, i: usize) -> Option<EdgeId> {
        self.node.prev().get(i).copied().flatten()
    }

    /// Edge currently in output slot `i`, if any.
    pub fn out_edge(&self, i: usize) -> Option<EdgeId> {
        self.node.next().get(i).copied().flatten()
    }

    /// Edge of input slot `i`, created from the declared shape on first access.
    pub fn ith_in_node(&mut self, graph: &mut Graph, i: usize) -> Result<EdgeId> {
        let shapes = self.in_shape();
        let shape = *shapes.get(i).ok_or(Error::IndexOutOfRange {
            what: "input shape",
            index: i,
            len: shapes.len(),
        })?;
        let vtype = self.in_types.get(i).copied().unwrap_or(VectorType::Data);
        self.node.input_edge(graph, i, shape, vtype)
    }

    /// Edge of output slot `i`, created with this layer as producer on first access.
    pub fn ith_out_node(&mut self, graph: &mut Graph, i: usize) -> Result<EdgeId> {
        let shapes = self.out_shape();
        let shape = *shapes.get(i).ok_or(Error::IndexOutOfRange {
            what: "output shape",
            index: i,
            len: shapes.len(),
        })?;
        let vtype = self.out_types.get(i).copied().unwrap_or(VectorType::Data);
        self.node.output_edge(graph, i, shape, vtype)
    }

    //  Lifecycle

    /// Check the wiring, allocate missing outputs, and fill weights when
    /// `reset_weight` is set or the layer was never initialized.
    pub fn setup(&mut self, graph: &mut Graph, reset_weight: bool) -> Result<()> {
        let declared_in = self.in_shape().len();
        if declared_in != self.node.in_size() {
            return Err(Error::ConnectionMismatch {
                side: "input",
                declared: declared_in,
                slots: self.node.in_size(),
            });
        }
        let declared_out = self.out_shape().len();
        if declared_out != self.node.out_size() {
            return Err(Error::ConnectionMismatch {
                side: "output",
                declared: declared_out,
                slots: self.node.out_size(),
            });
        }

        for i in 0..self.out_channels() {
            if self.out_edge(i).is_none() {
                self.ith_out_node(graph, i)?;
            }
        }

        if reset_weight || !self.initialized {
            self.init_weight(graph)?;
        }
        if reset_weight || self.state == LayerState::Uninitialized {
            self.state = LayerState::WeightsReady;
        }
        Ok(())
    }

    /// Fill every weight and bias slot with its initializer.
    pub fn init_weight(&mut self, graph: &mut Graph) -> Result<()> {
        if !self.trainable {
            self.initialized = true;
            return Ok(());
        }

        for i in 0..self.in_channels() {
            let init = match self.in_types[i] {
                VectorType::Weight => self.weight_init,
                VectorType::Bias => self.bias_init,
                _ => continue,
            };
            let (fan_in, fan_out) = (self.fan_in_size(i), self.fan_out_size(i));
            let id = self.ith_in_node(graph, i)?;
            let (edge, rng) = graph.edge_and_rng_mut(id)?;
            let dim = edge.shape().size();
            let data = edge.data_mut();
            tensor::grow_tensor(data, 1, dim);
            init.fill(&mut data[0], fan_in, fan_out, rng)?;
            debug!(
                "filled slot {} of {} ({:?}, fan {}/{})",
                i,
                self.id(),
                init,
                fan_in,
                fan_out
            );
        }

        info!("initialized weights of {} layer {}", self.layer_type(), self.id());
        self.initialized = true;
        Ok(())
    }

    /// Grow every batch-sized buffer to `samples`.
    pub fn set_sample_count(&mut self, graph: &mut Graph, samples: usize) -> Result<()> {
        for i in 0..self.in_channels() {
            let grow_data = !self.in_types[i].is_trainable_weight();
            let id = self.ith_in_node(graph, i)?;
            graph.edge_mut(id)?.grow(samples, grow_data);
        }
        for i in 0..self.out_channels() {
            let id = self.ith_out_node(graph, i)?;
            graph.edge_mut(id)?.grow(samples, true);
        }
        Ok(())
    }

    /// Run one forward pass over whatever is currently in the input edges.
    ///
    /// Runs `setup(false)` first, so a layer that was never set up gets its
    /// weights filled before the kernel sees them.
    pub fn forward(&mut self, graph: &mut Graph) -> Result<()> {
        self.setup(graph, false)?;
        let (in_ids, out_ids) = self.edges(graph)?;

        let samples = match in_ids.first() {
            Some(&id) => graph.edge(id)?.data().len(),
            None => 0,
        };
        self.set_sample_count(graph, samples)?;
        for &id in &out_ids {
            graph.edge_mut(id)?.clear_grads();
        }

        trace!(
            "forward {} layer {} ({} sample(s))",
            self.layer_type(),
            self.id(),
            samples
        );
        let groups = [(in_ids.as_slice(), Buffer::Data), (out_ids.as_slice(), Buffer::Data)];
        with_staged(graph, &groups, |staged| {
            let (ins, outs) = staged.split_at_mut(1);
            self.forward_propagation(&ins[0], &mut outs[0])
        })?;

        self.state = LayerState::Computed;
        Ok(())
    }

    /// Stage `inputs` into the data slots, run setup + forward, and return the
    /// first `inputs[0].len()` samples of every data output.
    pub fn forward_inputs<'g>(
        &mut self,
        graph: &'g mut Graph,
        inputs: &[Tensor],
    ) -> Result<Vec<&'g [Vector]>> {
        self.setup(graph, false)?;
        let samples = self.stage_inputs(graph, inputs)?;
        self.forward(graph)?;
        self.data_outputs(graph, samples)
    }

    /// Run one backward pass: fresh input gradients from the output gradients.
    pub fn backward(&mut self, graph: &mut Graph) -> Result<()> {
        let (in_ids, out_ids) = self.edges(graph)?;
        for &id in &in_ids {
            graph.edge_mut(id)?.clear_grads();
        }

        trace!("backward {} layer {}", self.layer_type(), self.id());
        let groups = [
            (in_ids.as_slice(), Buffer::Data),
            (out_ids.as_slice(), Buffer::Data),
            (out_ids.as_slice(), Buffer::Gradient),
            (in_ids.as_slice(), Buffer::Gradient),
        ];
        with_staged(graph, &groups, |staged| {
            let (fixed, in_grad) = staged.split_at_mut(3);
            self.back_propagation(&fixed[0], &fixed[1], &fixed[2], &mut in_grad[0])
        })
    }

    /// Layer math on explicit tensors: out_data = op(in_data).
    pub fn forward_propagation(&self, in_data: &[Tensor], out_data: &mut [Tensor]) -> Result<()> {
        let mut ctx = OpKernelContext::new(in_data, out_data, self.backend);
        self.kernel.compute(&mut ctx)
    }

    /// Layer derivative on explicit tensors: in_grad from out_grad.
    pub fn back_propagation(
        &self,
        in_data: &[Tensor],
        out_data: &[Tensor],
        out_grad: &[Tensor],
        in_grad: &mut [Tensor],
    ) -> Result<()> {
        let mut ctx = OpKernelGradContext::new(in_data, out_data, out_grad, in_grad, self.backend);
        self.kernel.compute_gradient(&mut ctx)
    }

    //  Staging helpers shared with Sequential

    /// Copy `inputs` into the leading samples of the data slots, in slot
    /// order. Returns the batch size.
    pub(crate) fn stage_inputs(&mut self, graph: &mut Graph, inputs: &[Tensor]) -> Result<usize> {
        let slots = self.data_in_slots();
        if slots.len() != inputs.len() {
            return Err(Error::InputCountMismatch {
                expected: slots.len(),
                got: inputs.len(),
            });
        }
        for (&slot, input) in slots.iter().zip(inputs) {
            let id = self.ith_in_node(graph, slot)?;
            graph.edge_mut(id)?.write_data(input)?;
        }
        Ok(inputs.first().map_or(0, Vec::len))
    }

    /// The first `samples` samples of every data output.
    pub(crate) fn data_outputs<'g>(
        &mut self,
        graph: &'g mut Graph,
        samples: usize,
    ) -> Result<Vec<&'g [Vector]>> {
        let mut ids = Vec::new();
        for i in 0..self.out_channels() {
            if self.out_types[i] == VectorType::Data {
                ids.push(self.ith_out_node(graph, i)?);
            }
        }
        let graph: &'g Graph = graph;
        ids.into_iter()
            .map(move |id| {
                let data = graph.edge(id)?.data();
                Ok(&data[..samples.min(data.len())])
            })
            .collect()
    }

    pub(crate) fn data_in_slots(&self) -> Vec<usize> {
        self.in_types
            .iter()
            .enumerate()
            .filter(|(_, t)| **t == VectorType::Data)
            .map(|(i, _)| i)
            .collect()
    }

    fn edges(&mut self, graph: &mut Graph) -> Result<(Vec<EdgeId>, Vec<EdgeId>)> {
        let in_ids = (0..self.in_channels())
            .map(|i| self.ith_in_node(graph, i))
            .collect::<Result<Vec<_>>>()?;
        let out_ids = (0..self.out_channels())
            .map(|i| self.ith_out_node(graph, i))
            .collect::<Result<Vec<_>>>()?;
        Ok((in_ids, out_ids))
    }
}

/// Wire output `head_index` of `head` into input `tail_index` of `tail`.
///
/// The two slots end up sharing one edge; nothing is copied between layers.
pub fn connect(
    graph: &mut Graph,
    head: &mut Layer,
    tail: &mut Layer,
    head_index: usize,
    tail_index: usize,
) -> Result<()> {
    let out_shapes = head.out_shape();
    let from = *out_shapes.get(head_index).ok_or(Error::IndexOutOfRange {
        what: "output slot",
        index: head_index,
        len: out_shapes.len(),
    })?;
    let in_shapes = tail.in_shape();
    let to = *in_shapes.get(tail_index).ok_or(Error::IndexOutOfRange {
        what: "input slot",
        index: tail_index,
        len: in_shapes.len(),
    })?;
    if from.size() != to.size() {
        return Err(Error::IncompatibleConnection { from, to });
    }

    let edge = head.ith_out_node(graph, head_index)?;
    tail.node.attach_input(graph, tail_index, edge)?;
    debug!(
        "connected {}[{}] -> {}[{}] via {}",
        head.id(),
        head_index,
        tail.id(),
        tail_index,
        edge
    );
    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum Buffer {
    Data,
    Gradient,
}

/// Move the listed buffers out of their edges, run `f`, and move them back,
/// whether or not `f` succeeded.
fn with_staged<R>(
    graph: &mut Graph,
    groups: &[(&[EdgeId], Buffer)],
    f: impl FnOnce(&mut [Vec<Tensor>]) -> Result<R>,
) -> Result<R> {
    for &(ids, _) in groups {
        for &id in ids {
            graph.edge(id)?;
        }
    }

    let mut staged: Vec<Vec<Tensor>> = Vec::with_capacity(groups.len());
    for &(ids, which) in groups {
        let mut taken = Vec::with_capacity(ids.len());
        for &id in ids {
            let edge = graph.edge_mut(id)?;
            taken.push(match which {
                Buffer::Data => edge.take_data(),
                Buffer::Gradient => edge.take_gradient(),
            });
        }
        staged.push(taken);
    }

    let result = f(&mut staged);
    restore(graph, groups, staged);
    result
}

fn restore(graph: &mut Graph, groups: &[(&[EdgeId], Buffer)], staged: Vec<Vec<Tensor>>) {
    // Reverse order so an edge listed twice gets its original buffer back last.
    for (&(ids, which), tensors) in groups.iter().zip(staged).rev() {
        for (&id, t) in ids.iter().zip(tensors).rev() {
            if let Ok(edge) = graph.edge_mut(id) {
                match which {
                    Buffer::Data => edge.restore_data(t),
                    Buffer::Gradient => edge.restore_gradient(t),
                }
            }
        }
    }
}
