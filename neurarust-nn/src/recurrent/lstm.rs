use crate::layers::map::logistic;
use crate::layers::Linear;
use crate::module::{batched, check_input, usage_error, Container, Module};
use crate::serialize::{ModuleNode, ModuleRegistry};
use neurarust_tensor::{NeuraNumeric, NeuraRustError, Tensor};
use rand::Rng;

/// Names of the affine sub-layers, in parameter order.
const GATE_NAMES: [&str; 11] = [
    "inp_gate_x",
    "inp_gate_y",
    "inp_gate_h",
    "fgt_gate_x",
    "fgt_gate_y",
    "fgt_gate_h",
    "inp_mod_x",
    "inp_mod_y",
    "out_gate_x",
    "out_gate_y",
    "out_gate_h",
];

const INP_GATE_X: usize = 0;
const INP_GATE_Y: usize = 1;
const INP_GATE_H: usize = 2;
const FGT_GATE_X: usize = 3;
const FGT_GATE_Y: usize = 4;
const FGT_GATE_H: usize = 5;
const INP_MOD_X: usize = 6;
const INP_MOD_Y: usize = 7;
const OUT_GATE_X: usize = 8;
const OUT_GATE_Y: usize = 9;
const OUT_GATE_H: usize = 10;

/// Activations of one step, kept for backward.
#[derive(Debug, Clone)]
struct StepCache<T> {
    inp_gate: Tensor<T>,
    fgt_gate: Tensor<T>,
    inp_mod: Tensor<T>,
    out_gate: Tensor<T>,
    cell_act: Tensor<T>,
}

impl<T: NeuraNumeric> Default for StepCache<T> {
    fn default() -> Self {
        StepCache {
            inp_gate: Tensor::empty(),
            fgt_gate: Tensor::empty(),
            inp_mod: Tensor::empty(),
            out_gate: Tensor::empty(),
            cell_act: Tensor::empty(),
        }
    }
}

/// A long short-term memory cell with peephole connections.
///
/// Per step, with `y'`/`c'` the previous output and cell state:
///
/// ```text
/// i = σ(Wix x + Wiy y' + Wih c')
/// f = σ(Wfx x + Wfy y' + Wfh c')
/// g = tanh(Wgx x + Wgy y')
/// c = i ⊙ g + f ⊙ c'
/// o = σ(Wox x + Woy y' + Woh c)
/// y = o ⊙ tanh(c)
/// ```
///
/// Every `W` is a [`Linear`] with its own bias. The state is `[y, c]`,
/// held apart from the output buffer so rewinding the state never touches
/// what downstream layers read through `output()`.
/// As with [`crate::recurrent::Recurrent`], `backward` expects the state of
/// the step being differentiated, replays that step, carries the output and
/// cell gradients to the next call, and leaves the state unchanged.
#[derive(Debug, Clone)]
pub struct Lstm<T: NeuraNumeric> {
    gates: Vec<Linear<T>>,
    prev_output: Tensor<T>,
    prev_cell: Tensor<T>,
    state_output: Tensor<T>,
    cell: Tensor<T>,
    output: Tensor<T>,
    cache: StepCache<T>,
    output_grad: Tensor<T>,
    cell_grad: Tensor<T>,
    in_grad: Tensor<T>,
    reset_grad: bool,
    clip: Option<f64>,
}

impl<T: NeuraNumeric> Lstm<T> {
    pub fn new(inputs: usize, outputs: usize) -> Result<Self, NeuraRustError> {
        Self::with_rng(inputs, outputs, &mut rand::thread_rng())
    }

    pub fn with_rng<R: Rng + ?Sized>(inputs: usize, outputs: usize, rng: &mut R) -> Result<Self, NeuraRustError> {
        let gates = GATE_NAMES
            .iter()
            .map(|name| {
                let fan_in = if name.ends_with("_x") { inputs } else { outputs };
                Linear::with_rng(fan_in, outputs, rng)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_gates(gates)
    }

    /// Builds a cell from its eleven affine sub-layers, in the order
    /// `inp_gate_{x,y,h}, fgt_gate_{x,y,h}, inp_mod_{x,y}, out_gate_{x,y,h}`.
    pub fn from_gates(gates: Vec<Linear<T>>) -> Result<Self, NeuraRustError> {
        if gates.len() != GATE_NAMES.len() {
            return Err(NeuraRustError::ConfigurationError(format!(
                "LSTM needs {} gate layers, got {}",
                GATE_NAMES.len(),
                gates.len()
            )));
        }
        let inputs = gates[INP_GATE_X].inputs();
        let outputs = gates[INP_GATE_X].outputs();
        for (gate, name) in gates.iter().zip(GATE_NAMES) {
            let fan_in = if name.ends_with("_x") { inputs } else { outputs };
            if gate.inputs() != fan_in || gate.outputs() != outputs {
                return Err(NeuraRustError::shape_mismatch(
                    &[fan_in, outputs],
                    &[gate.inputs(), gate.outputs()],
                    name,
                ));
            }
        }
        Ok(Lstm {
            gates,
            prev_output: Tensor::empty(),
            prev_cell: Tensor::empty(),
            state_output: Tensor::empty(),
            cell: Tensor::empty(),
            output: Tensor::empty(),
            cache: StepCache::default(),
            output_grad: Tensor::empty(),
            cell_grad: Tensor::empty(),
            in_grad: Tensor::empty(),
            reset_grad: true,
            clip: None,
        })
    }

    /// Clamps the input gradient into `[-bound, bound]`; `None` disables it.
    pub fn set_clip(&mut self, bound: Option<f64>) -> Result<(), NeuraRustError> {
        if let Some(b) = bound {
            if b.is_nan() || b <= 0.0 {
                return Err(NeuraRustError::ConfigurationError(format!(
                    "LSTM gradient clip bound must be positive, got {}",
                    b
                )));
            }
        }
        self.clip = bound;
        Ok(())
    }

    pub fn clip(&self) -> Option<f64> {
        self.clip
    }

    pub fn gate(&self, name: &str) -> Option<&Linear<T>> {
        GATE_NAMES.iter().position(|n| *n == name).map(|i| &self.gates[i])
    }

    pub fn inputs(&self) -> usize {
        self.gates[INP_GATE_X].inputs()
    }

    pub fn outputs(&self) -> usize {
        self.gates[INP_GATE_X].outputs()
    }

    /// The cell state `c`, `[batch, outputs]`.
    pub fn cell_state(&self) -> &Tensor<T> {
        &self.cell
    }

    fn ensure_state(&mut self, batch: usize) {
        let shape = [batch, self.outputs()];
        if self.state_output.shape() != shape || self.cell.shape() != shape {
            log::debug!("LSTM state reset to {:?}", shape);
            self.state_output = Tensor::zeros(&shape);
            self.cell = Tensor::zeros(&shape);
        }
    }

    /// Sum of the given gates' forward outputs on their respective inputs.
    fn affine(&mut self, parts: &[(usize, &Tensor<T>)]) -> Result<Tensor<T>, NeuraRustError> {
        let mut total = self.gates[parts[0].0].forward(parts[0].1)?.clone();
        for &(gate, x) in &parts[1..] {
            total.add_(self.gates[gate].forward(x)?)?;
        }
        Ok(total)
    }

    /// One step from the current state; the previous state moves into
    /// `prev_output`/`prev_cell`.
    fn step(&mut self, x: &Tensor<T>) -> Result<(), NeuraRustError> {
        let batch = check_input(x, &[self.inputs()], "LSTM forward")?;
        self.ensure_state(batch);
        let y_prev = std::mem::take(&mut self.state_output);
        let c_prev = std::mem::take(&mut self.cell);

        let mut inp_gate = self.affine(&[(INP_GATE_X, x), (INP_GATE_Y, &y_prev), (INP_GATE_H, &c_prev)])?;
        inp_gate.map_(logistic);
        let mut fgt_gate = self.affine(&[(FGT_GATE_X, x), (FGT_GATE_Y, &y_prev), (FGT_GATE_H, &c_prev)])?;
        fgt_gate.map_(logistic);
        let mut inp_mod = self.affine(&[(INP_MOD_X, x), (INP_MOD_Y, &y_prev)])?;
        inp_mod.map_(|v| v.tanh());

        let mut cell = inp_gate.mul(&inp_mod)?;
        cell.add_(&fgt_gate.mul(&c_prev)?)?;

        let mut out_gate = self.affine(&[(OUT_GATE_X, x), (OUT_GATE_Y, &y_prev), (OUT_GATE_H, &cell)])?;
        out_gate.map_(logistic);
        let cell_act = cell.map(|v| v.tanh());

        self.output = out_gate.mul(&cell_act)?;
        self.state_output = self.output.clone();
        self.cell = cell;
        self.prev_output = y_prev;
        self.prev_cell = c_prev;
        self.cache = StepCache {
            inp_gate,
            fgt_gate,
            inp_mod,
            out_gate,
            cell_act,
        };
        Ok(())
    }

    /// Runs `backward` on `gate` and returns its input gradient.
    fn gate_backward(&mut self, gate: usize, x: &Tensor<T>, grad: &Tensor<T>) -> Result<Tensor<T>, NeuraRustError> {
        Ok(self.gates[gate].backward(x, grad)?.clone())
    }

    pub fn load(node: &ModuleNode, registry: &ModuleRegistry<T>) -> Result<Self, NeuraRustError> {
        node.expect_kind("LSTM")?;
        node.expect_children(GATE_NAMES.len())?;
        let gates = node
            .children
            .iter()
            .map(|child| Linear::load(child, registry))
            .collect::<Result<Vec<_>, _>>()?;
        let mut lstm = Self::from_gates(gates)?;
        if let Some(&bound) = node.attrs.get("clip") {
            lstm.set_clip(Some(bound))?;
        }
        Ok(lstm)
    }
}

impl<T: NeuraNumeric> Module<T> for Lstm<T> {
    fn type_name(&self) -> &'static str {
        "LSTM"
    }

    fn forward(&mut self, input: &Tensor<T>) -> Result<&Tensor<T>, NeuraRustError> {
        self.step(input)?;
        Ok(&self.output)
    }

    fn backward(&mut self, input: &Tensor<T>, out_grad: &Tensor<T>) -> Result<&Tensor<T>, NeuraRustError> {
        self.step(input)?;
        out_grad.expect_shape(self.output.shape(), "LSTM backward")?;
        let one = T::one();
        let x = input;
        let y_prev = self.prev_output.clone();
        let c_prev = self.prev_cell.clone();
        let cell = self.cell.clone();
        let StepCache {
            inp_gate: i,
            fgt_gate: f,
            inp_mod: g,
            out_gate: o,
            cell_act: a,
        } = self.cache.clone();

        let mut dy = out_grad.clone();
        let mut dc_carry = Tensor::zeros(cell.shape());
        if !self.reset_grad {
            dy.add_(&self.output_grad)?;
            dc_carry.copy_from_(&self.cell_grad);
        }
        self.reset_grad = false;

        // output gate
        let dzo = dy.zip_map(&a, |d, a| d * a)?.zip_map(&o, |d, o| d * o * (one - o))?;
        let dx_o = self.gate_backward(OUT_GATE_X, x, &dzo)?;
        let dy_o = self.gate_backward(OUT_GATE_Y, &y_prev, &dzo)?;
        let dc_peep = self.gate_backward(OUT_GATE_H, &cell, &dzo)?;

        // cell
        let mut dc = dy.zip_map(&o, |d, o| d * o)?.zip_map(&a, |d, a| d * (one - a * a))?;
        dc.add_(&dc_carry)?;
        dc.add_(&dc_peep)?;

        // input gate, forget gate, input modulation
        let dzi = dc.mul(&g)?.zip_map(&i, |d, i| d * i * (one - i))?;
        let dzg = dc.mul(&i)?.zip_map(&g, |d, g| d * (one - g * g))?;
        let dzf = dc.mul(&c_prev)?.zip_map(&f, |d, f| d * f * (one - f))?;

        let dx_i = self.gate_backward(INP_GATE_X, x, &dzi)?;
        let dy_i = self.gate_backward(INP_GATE_Y, &y_prev, &dzi)?;
        let dc_i = self.gate_backward(INP_GATE_H, &c_prev, &dzi)?;
        let dx_f = self.gate_backward(FGT_GATE_X, x, &dzf)?;
        let dy_f = self.gate_backward(FGT_GATE_Y, &y_prev, &dzf)?;
        let dc_f = self.gate_backward(FGT_GATE_H, &c_prev, &dzf)?;
        let dx_g = self.gate_backward(INP_MOD_X, x, &dzg)?;
        let dy_g = self.gate_backward(INP_MOD_Y, &y_prev, &dzg)?;

        let mut dc_prev = dc.mul(&f)?;
        dc_prev.add_(&dc_i)?;
        dc_prev.add_(&dc_f)?;

        let mut dy_prev = dy_i;
        dy_prev.add_(&dy_f)?;
        dy_prev.add_(&dy_g)?;
        dy_prev.add_(&dy_o)?;

        let mut dx = dx_i;
        dx.add_(&dx_f)?;
        dx.add_(&dx_g)?;
        dx.add_(&dx_o)?;
        if let Some(bound) = self.clip {
            let bound = T::from_f64_lossy(bound);
            dx.clip_(-bound, bound);
        }

        self.output_grad = dy_prev;
        self.cell_grad = dc_prev;
        self.in_grad = dx;
        // leave the state as the caller set it; `output` keeps the replayed step
        self.state_output = y_prev;
        self.cell = c_prev;
        Ok(&self.in_grad)
    }

    fn output(&self) -> &Tensor<T> {
        &self.output
    }

    fn in_grad(&self) -> &Tensor<T> {
        &self.in_grad
    }

    fn input_shape(&self) -> Vec<usize> {
        vec![self.inputs()]
    }

    fn output_shape(&self) -> Vec<usize> {
        vec![self.outputs()]
    }

    fn batch(&self) -> usize {
        self.state_output.shape().first().copied().unwrap_or(0)
    }

    fn set_inputs(&mut self, shape: &[usize]) -> Result<(), NeuraRustError> {
        for (gate, name) in self.gates.iter_mut().zip(GATE_NAMES) {
            if name.ends_with("_x") {
                gate.set_inputs(shape)?;
            }
        }
        Ok(())
    }

    fn set_outputs(&mut self, shape: &[usize]) -> Result<(), NeuraRustError> {
        for (gate, name) in self.gates.iter_mut().zip(GATE_NAMES) {
            if !name.ends_with("_x") {
                gate.set_inputs(shape)?;
            }
            gate.set_outputs(shape)?;
        }
        let batch = self.batch();
        self.output = Tensor::empty();
        self.state_output = Tensor::empty();
        self.ensure_state(batch);
        Ok(())
    }

    fn set_batch(&mut self, batch: usize) -> Result<(), NeuraRustError> {
        self.gates.iter_mut().try_for_each(|g| g.set_batch(batch))?;
        self.ensure_state(batch);
        self.in_grad.resize(&batched(batch, &[self.inputs()]));
        Ok(())
    }

    fn params(&self) -> Vec<&Tensor<T>> {
        self.gates.iter().flat_map(|g| g.params()).collect()
    }

    fn params_mut(&mut self) -> Vec<&mut Tensor<T>> {
        self.gates.iter_mut().flat_map(|g| g.params_mut()).collect()
    }

    fn grads(&self) -> Vec<&Tensor<T>> {
        self.gates.iter().flat_map(|g| g.grads()).collect()
    }

    fn grads_mut(&mut self) -> Vec<&mut Tensor<T>> {
        self.gates.iter_mut().flat_map(|g| g.grads_mut()).collect()
    }

    /// `[y, c]`.
    fn states(&self) -> Vec<&Tensor<T>> {
        vec![&self.state_output, &self.cell]
    }

    fn states_mut(&mut self) -> Vec<&mut Tensor<T>> {
        vec![&mut self.state_output, &mut self.cell]
    }

    fn reset_state(&mut self) {
        self.state_output.fill_(T::zero());
        self.cell.fill_(T::zero());
    }

    fn reset_state_grad(&mut self) {
        self.reset_grad = true;
    }

    fn clone_module(&self) -> Box<dyn Module<T>> {
        Box::new(self.clone())
    }

    fn save(&self) -> Result<ModuleNode, NeuraRustError> {
        let mut node = ModuleNode::new("LSTM");
        if let Some(bound) = self.clip {
            node = node.with_attr("clip", bound);
        }
        for gate in &self.gates {
            node = node.with_child(gate.save()?);
        }
        Ok(node)
    }
}

impl<T: NeuraNumeric> Container<T> for Lstm<T> {
    fn add(&mut self, _module: Box<dyn Module<T>>) -> Result<(), NeuraRustError> {
        Err(usage_error("cannot add components to LSTM"))
    }

    fn remove(&mut self, _index: usize) -> Result<Box<dyn Module<T>>, NeuraRustError> {
        Err(usage_error("cannot remove components of LSTM"))
    }

    fn clear(&mut self) -> Result<(), NeuraRustError> {
        Err(usage_error("cannot clear LSTM"))
    }

    fn components(&self) -> Vec<&dyn Module<T>> {
        self.gates.iter().map(|g| g as &dyn Module<T>).collect()
    }
}

#[cfg(test)]
#[path = "lstm_test.rs"]
mod tests;
