//! BERT encoder + classifier, with mesh-aware weight layouts.
//!
//! The attention projections are stored as rank-3 kernels
//! `[hidden, heads, head_dim]` with rank-2 biases `[heads, head_dim]`, the
//! shapes the classic sharding table is written against; the forward pass
//! views them as rank-2 matrices through a differentiable reshape. Weight
//! names follow the `transformer/layer_N/...` path convention the layout
//! regexes expect.

use crate::autograd::{concat_cols, concat_rows, Variable};
use crate::mesh::{DeviceMesh, Layout, LayoutMap, Sharding};
use crate::nn::{uniform_init, Dense, LayerNorm, OneHotEmbedding};
use crate::optim::Optimizer;
use crate::tensor::{Cpu, Tensor, TensorElem};
use rand::Rng;
use std::collections::HashMap;

use super::{ModelError, Result};

/// Hyperparameters of the classifier.
#[derive(Clone, Debug)]
pub struct BertConfig {
    pub vocab_size: usize,
    pub num_classes: usize,
    pub max_seq_len: usize,
    pub type_vocab_size: usize,
    pub hidden: usize,
    pub num_layers: usize,
    pub num_heads: usize,
    pub intermediate: usize,
}

impl Default for BertConfig {
    /// The demo configuration: the original task (vocab 100, 2 classes,
    /// sequences of 10) over a CPU-sized encoder.
    fn default() -> Self {
        Self {
            vocab_size: 100,
            num_classes: 2,
            max_seq_len: 10,
            type_vocab_size: 2,
            hidden: 64,
            num_layers: 2,
            num_heads: 4,
            intermediate: 256,
        }
    }
}

impl BertConfig {
    pub fn head_dim(&self) -> usize {
        self.hidden / self.num_heads
    }

    fn validate(&self) -> Result<()> {
        if self.hidden == 0 || self.num_heads == 0 || self.num_layers == 0 {
            return Err(ModelError::InvalidConfig(
                "hidden, num_heads and num_layers must be nonzero".into(),
            ));
        }
        if self.hidden % self.num_heads != 0 {
            return Err(ModelError::InvalidConfig(format!(
                "hidden ({}) not divisible by num_heads ({})",
                self.hidden, self.num_heads
            )));
        }
        Ok(())
    }
}

/// One weight's resolved placement: the model's sharding report entry.
#[derive(Clone, Debug)]
pub struct WeightSpec {
    pub name: String,
    pub shape: Vec<usize>,
    pub layout: Layout,
}

/// The layout table of the original demo: pooler and attention q/k/v
/// projections sharded over the model dimension, the feed-forward output
/// dense row-sharded, everything else replicated.
pub fn model_parallel_layout_map(model_dim: &str) -> crate::mesh::Result<LayoutMap> {
    let mut map = LayoutMap::new();

    map.insert(
        "pooler_transform.*kernel",
        Layout::new(vec![Sharding::Unsharded, Sharding::dim(model_dim)]),
    )?;
    map.insert(
        "pooler_transform.*bias",
        Layout::new(vec![Sharding::dim(model_dim)]),
    )?;

    for proj in ["query", "key", "value"] {
        map.insert(
            &format!("attention_layer.*{proj}.*kernel"),
            Layout::new(vec![
                Sharding::Unsharded,
                Sharding::Unsharded,
                Sharding::dim(model_dim),
            ]),
        )?;
        map.insert(
            &format!("attention_layer.*{proj}.*bias"),
            Layout::new(vec![Sharding::dim(model_dim), Sharding::Unsharded]),
        )?;
    }

    map.insert(
        r"transformer/layer_\d+.*output_dense.*kernel",
        Layout::new(vec![Sharding::dim(model_dim), Sharding::Unsharded]),
    )?;
    map.insert(
        r"transformer/layer_\d+.*output_dense.*bias",
        Layout::new(vec![Sharding::Unsharded]),
    )?;

    Ok(map)
}

#[derive(Clone, Debug)]
struct AttentionWeights<T: TensorElem> {
    query_kernel: Variable<T, 3>,
    query_bias: Variable<T, 2>,
    key_kernel: Variable<T, 3>,
    key_bias: Variable<T, 2>,
    value_kernel: Variable<T, 3>,
    value_bias: Variable<T, 2>,
    output: Dense<T>,
}

impl<T: TensorElem + 'static> AttentionWeights<T> {
    fn new(config: &BertConfig, rng: &mut impl Rng) -> Self {
        let h = config.hidden;
        let heads = config.num_heads;
        let hd = config.head_dim();
        let limit = crate::nn::glorot_limit(h, h);

        Self {
            query_kernel: uniform_init([h, heads, hd], limit, rng),
            query_bias: Variable::new(Tensor::zeros([heads, hd])),
            key_kernel: uniform_init([h, heads, hd], limit, rng),
            key_bias: Variable::new(Tensor::zeros([heads, hd])),
            value_kernel: uniform_init([h, heads, hd], limit, rng),
            value_bias: Variable::new(Tensor::zeros([heads, hd])),
            output: Dense::new(h, h, rng),
        }
    }
}

#[derive(Clone, Debug)]
struct EncoderLayer<T: TensorElem> {
    attention: AttentionWeights<T>,
    attention_norm: LayerNorm<T>,
    intermediate: Dense<T>,
    output_dense: Dense<T>,
    output_norm: LayerNorm<T>,
}

impl<T: TensorElem + 'static> EncoderLayer<T> {
    fn new(config: &BertConfig, rng: &mut impl Rng) -> Self {
        Self {
            attention: AttentionWeights::new(config, rng),
            attention_norm: LayerNorm::new(config.hidden),
            intermediate: Dense::new(config.hidden, config.intermediate, rng),
            output_dense: Dense::new(config.intermediate, config.hidden, rng),
            output_norm: LayerNorm::new(config.hidden),
        }
    }

    /// One encoder block over `[batch * seq, hidden]` activations.
    fn forward(
        &self,
        x: &Variable<T, 2>,
        batch: usize,
        seq: usize,
        mask: &Tensor<u32, 2, Cpu>,
        config: &BertConfig,
    ) -> Result<Variable<T, 2>> {
        let h = config.hidden;
        let heads = config.num_heads;
        let hd = config.head_dim();

        // View the rank-3 projections as plain matrices for the matmuls.
        let wq = self.attention.query_kernel.reshape([h, h])?;
        let wk = self.attention.key_kernel.reshape([h, h])?;
        let wv = self.attention.value_kernel.reshape([h, h])?;
        let bq = self.attention.query_bias.reshape([h])?;
        let bk = self.attention.key_bias.reshape([h])?;
        let bv = self.attention.value_bias.reshape([h])?;

        let q = x.matmul(&wq)?.add_bias(&bq)?;
        let k = x.matmul(&wk)?.add_bias(&bk)?;
        let v = x.matmul(&wv)?.add_bias(&bv)?;

        let scale = T::from_f64(1.0 / (hd as f64).sqrt()).unwrap_or_else(T::one);

        let mut batch_outputs = Vec::with_capacity(batch);
        for b in 0..batch {
            let rows = b * seq..(b + 1) * seq;

            // Masked-out key positions get a large negative additive bias
            // before the softmax, per column.
            let mut mask_bias = Tensor::<T, 2>::zeros([seq, seq]);
            for j in 0..seq {
                if mask.data()[b * seq + j] == 0 {
                    let neg = T::from_f64(-1e9).unwrap_or_else(T::zero);
                    for i in 0..seq {
                        mask_bias.data_mut()[i * seq + j] = neg;
                    }
                }
            }
            let mask_bias = Variable::new(mask_bias);

            let mut head_outputs = Vec::with_capacity(heads);
            for head in 0..heads {
                let cols = head * hd..(head + 1) * hd;

                let qh = q.slice_block(rows.clone(), cols.clone())?;
                let kh = k.slice_block(rows.clone(), cols.clone())?;
                let vh = v.slice_block(rows.clone(), cols.clone())?;

                let scores = qh.matmul(&kh.transpose()?)?.scale(scale) + mask_bias.clone();
                let probs = scores.softmax_rows();
                head_outputs.push(probs.matmul(&vh)?);
            }

            batch_outputs.push(concat_cols(&head_outputs)?);
        }

        let attn = concat_rows(&batch_outputs)?;
        let attn_out = self.attention.output.forward(&attn)?;
        let x = self.attention_norm.forward(&(attn_out + x.clone()))?;

        let ffn = self.intermediate.forward(&x)?.gelu();
        let ffn_out = self.output_dense.forward(&ffn)?;
        Ok(self.output_norm.forward(&(ffn_out + x))?)
    }
}

/// The classifier, with every weight placed on the mesh at build time.
#[derive(Clone, Debug)]
pub struct BertClassifier<T: TensorElem> {
    config: BertConfig,
    word_embeddings: OneHotEmbedding<T>,
    position_embeddings: Variable<T, 2>,
    type_embeddings: OneHotEmbedding<T>,
    embedding_norm: LayerNorm<T>,
    layers: Vec<EncoderLayer<T>>,
    pooler_transform: Dense<T>,
    logits: Dense<T>,
    specs: Vec<WeightSpec>,
}

/// Walks every weight of the model as `(name, variable)` pairs, in a fixed
/// order. `$m` is invoked once per weight; `$iter` selects shared or
/// mutable traversal of the encoder layers.
macro_rules! visit_weights {
    ($self:expr, $iter:ident, $m:ident) => {
        $m!("word_embeddings/embeddings", $self.word_embeddings.table);
        $m!("position_embeddings/embeddings", $self.position_embeddings);
        $m!("type_embeddings/embeddings", $self.type_embeddings.table);
        $m!("embeddings/layer_norm/gamma", $self.embedding_norm.gamma);
        $m!("embeddings/layer_norm/beta", $self.embedding_norm.beta);

        for (i, layer) in $self.layers.$iter().enumerate() {
            $m!(
                format!("transformer/layer_{i}/attention_layer/query/kernel"),
                layer.attention.query_kernel
            );
            $m!(
                format!("transformer/layer_{i}/attention_layer/query/bias"),
                layer.attention.query_bias
            );
            $m!(
                format!("transformer/layer_{i}/attention_layer/key/kernel"),
                layer.attention.key_kernel
            );
            $m!(
                format!("transformer/layer_{i}/attention_layer/key/bias"),
                layer.attention.key_bias
            );
            $m!(
                format!("transformer/layer_{i}/attention_layer/value/kernel"),
                layer.attention.value_kernel
            );
            $m!(
                format!("transformer/layer_{i}/attention_layer/value/bias"),
                layer.attention.value_bias
            );
            $m!(
                format!("transformer/layer_{i}/attention_output/kernel"),
                layer.attention.output.kernel
            );
            $m!(
                format!("transformer/layer_{i}/attention_output/bias"),
                layer.attention.output.bias
            );
            $m!(
                format!("transformer/layer_{i}/attention_layer_norm/gamma"),
                layer.attention_norm.gamma
            );
            $m!(
                format!("transformer/layer_{i}/attention_layer_norm/beta"),
                layer.attention_norm.beta
            );
            $m!(
                format!("transformer/layer_{i}/intermediate/kernel"),
                layer.intermediate.kernel
            );
            $m!(
                format!("transformer/layer_{i}/intermediate/bias"),
                layer.intermediate.bias
            );
            $m!(
                format!("transformer/layer_{i}/output_dense/kernel"),
                layer.output_dense.kernel
            );
            $m!(
                format!("transformer/layer_{i}/output_dense/bias"),
                layer.output_dense.bias
            );
            $m!(
                format!("transformer/layer_{i}/output_layer_norm/gamma"),
                layer.output_norm.gamma
            );
            $m!(
                format!("transformer/layer_{i}/output_layer_norm/beta"),
                layer.output_norm.beta
            );
        }

        $m!("pooler_transform/kernel", $self.pooler_transform.kernel);
        $m!("pooler_transform/bias", $self.pooler_transform.bias);
        $m!("logits/kernel", $self.logits.kernel);
        $m!("logits/bias", $self.logits.bias);
    };
}

fn update_param<T, O, const RANK: usize>(
    optimizer: &mut O,
    key: usize,
    var: &mut Variable<T, RANK>,
) -> Result<()>
where
    T: TensorElem + 'static,
    O: Optimizer<T>,
{
    let grad = var.grad.borrow().clone();
    if let Some(grad) = grad {
        optimizer.update(key, &mut var.data, &grad)?;
    }
    Ok(())
}

impl<T: TensorElem + 'static> BertClassifier<T> {
    /// Builds the model, resolving and validating every weight's layout
    /// against the mesh. Weights matched by no rule are replicated.
    pub fn new(
        config: BertConfig,
        mesh: &DeviceMesh,
        layout_map: &LayoutMap,
        rng: &mut impl Rng,
    ) -> Result<Self> {
        config.validate()?;

        let mut model = Self {
            word_embeddings: OneHotEmbedding::new(config.vocab_size, config.hidden, rng),
            position_embeddings: uniform_init([config.max_seq_len, config.hidden], 0.05, rng),
            type_embeddings: OneHotEmbedding::new(config.type_vocab_size, config.hidden, rng),
            embedding_norm: LayerNorm::new(config.hidden),
            layers: (0..config.num_layers)
                .map(|_| EncoderLayer::new(&config, rng))
                .collect(),
            pooler_transform: Dense::new(config.hidden, config.hidden, rng),
            logits: Dense::new(config.hidden, config.num_classes, rng),
            specs: Vec::new(),
            config,
        };

        let mut specs = Vec::new();
        macro_rules! resolve {
            ($name:expr, $var:expr) => {
                let name: String = $name.into();
                let shape = $var.data.shape().to_vec();
                let layout = layout_map
                    .resolve(&name)
                    .cloned()
                    .unwrap_or_else(|| Layout::replicated(shape.len()));
                layout.validate(mesh, &shape).map_err(ModelError::Mesh)?;
                specs.push(WeightSpec {
                    name,
                    shape,
                    layout,
                });
            };
        }
        visit_weights!(model, iter, resolve);

        model.specs = specs;
        Ok(model)
    }

    pub fn config(&self) -> &BertConfig {
        &self.config
    }

    /// The per-weight sharding report: one entry per trainable weight, in
    /// traversal order.
    pub fn weight_specs(&self) -> &[WeightSpec] {
        &self.specs
    }

    /// Runs the classifier. Inputs are `[batch, seq]` id tensors; the
    /// output is `[batch, num_classes]` logits.
    pub fn forward(
        &self,
        word_ids: &Tensor<u32, 2, Cpu>,
        mask: &Tensor<u32, 2, Cpu>,
        type_ids: &Tensor<u32, 2, Cpu>,
    ) -> Result<Variable<T, 2>> {
        let [batch, seq] = *word_ids.shape();
        let h = self.config.hidden;

        if seq > self.config.max_seq_len {
            return Err(ModelError::InvalidConfig(format!(
                "sequence length {seq} exceeds max_seq_len {}",
                self.config.max_seq_len
            )));
        }
        if mask.shape() != word_ids.shape() || type_ids.shape() != word_ids.shape() {
            return Err(ModelError::Tensor(crate::tensor::TensorError::ShapeMismatch {
                expected: word_ids.shape().to_vec(),
                got: mask.shape().to_vec(),
            }));
        }

        let word = self.word_embeddings.forward(word_ids.data())?;
        let types = self.type_embeddings.forward(type_ids.data())?;

        // Position embeddings: the first `seq` rows of the table, tiled
        // once per batch element. Clones share the gradient cell, so the
        // tiled uses all accumulate into the table.
        let pos_block = self.position_embeddings.slice_block(0..seq, 0..h)?;
        let pos = concat_rows(&vec![pos_block; batch])?;

        let embedded = word + pos + types;
        let mut x = self.embedding_norm.forward(&embedded)?;

        for layer in &self.layers {
            x = layer.forward(&x, batch, seq, mask, &self.config)?;
        }

        // Pool the CLS (first) position of each sequence.
        let mut cls_rows = Vec::with_capacity(batch);
        for b in 0..batch {
            cls_rows.push(x.slice_block(b * seq..b * seq + 1, 0..h)?);
        }
        let cls = concat_rows(&cls_rows)?;

        let pooled = self.pooler_transform.forward(&cls)?.tanh();
        Ok(self.logits.forward(&pooled)?)
    }

    /// Applies accumulated gradients through `optimizer`, one call per
    /// weight with a stable key.
    pub fn apply_gradients<O: Optimizer<T>>(&mut self, optimizer: &mut O) -> Result<()> {
        let mut key = 0usize;
        macro_rules! upd {
            ($name:expr, $var:expr) => {
                update_param(optimizer, key, &mut $var)?;
                key += 1;
            };
        }
        visit_weights!(self, iter_mut, upd);
        let _ = key;
        Ok(())
    }

    /// Clears every weight's gradient.
    pub fn zero_grad(&mut self) {
        macro_rules! zero {
            ($name:expr, $var:expr) => {
                $var.zero_grad();
            };
        }
        visit_weights!(self, iter_mut, zero);
    }

    /// Every weight flattened to rank 1, keyed by name. The checkpoint
    /// format.
    pub fn flattened_weights(&self) -> Result<Vec<(String, Tensor<T, 1, Cpu>)>> {
        let mut out = Vec::new();
        macro_rules! flatten {
            ($name:expr, $var:expr) => {
                let name: String = $name.into();
                let size = $var.data.size();
                out.push((name, $var.data.clone().reshape([size])?));
            };
        }
        visit_weights!(self, iter, flatten);
        Ok(out)
    }

    /// Restores weights from their flattened form, by name.
    ///
    /// Weights absent from `weights` are left untouched; size mismatches
    /// are an error.
    pub fn load_flattened_weights(
        &mut self,
        weights: &HashMap<String, Tensor<T, 1, Cpu>>,
    ) -> Result<()> {
        macro_rules! restore {
            ($name:expr, $var:expr) => {
                let name: String = $name.into();
                if let Some(flat) = weights.get(&name) {
                    if flat.size() != $var.data.size() {
                        return Err(ModelError::Tensor(
                            crate::tensor::TensorError::ShapeMismatch {
                                expected: vec![$var.data.size()],
                                got: vec![flat.size()],
                            },
                        ));
                    }
                    $var.data.data_mut().copy_from_slice(flat.data());
                }
            };
        }
        visit_weights!(self, iter_mut, restore);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{DeviceType, LocalClient};
    use crate::optim::Sgd;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn demo_mesh() -> DeviceMesh {
        let client = LocalClient::configure_virtual_cpus(8).unwrap();
        DeviceMesh::distributed(&[("batch", 4), ("model", 2)], &client, DeviceType::Cpu, 8)
            .unwrap()
    }

    fn tiny_config() -> BertConfig {
        BertConfig {
            vocab_size: 11,
            num_classes: 2,
            max_seq_len: 4,
            type_vocab_size: 2,
            hidden: 8,
            num_layers: 1,
            num_heads: 2,
            intermediate: 16,
        }
    }

    fn tiny_model() -> BertClassifier<f32> {
        let mesh = demo_mesh();
        let map = model_parallel_layout_map("model").unwrap();
        let mut rng = StdRng::seed_from_u64(1337);
        BertClassifier::new(tiny_config(), &mesh, &map, &mut rng).unwrap()
    }

    fn ones_mask(batch: usize, seq: usize) -> Tensor<u32, 2, Cpu> {
        Tensor::new(vec![1u32; batch * seq], [batch, seq]).unwrap()
    }

    #[test]
    fn test_config_validation() {
        let mut bad = tiny_config();
        bad.num_heads = 3; // 8 % 3 != 0
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_layout_table_resolution() {
        let model = tiny_model();
        let spec_for = |name: &str| {
            model
                .weight_specs()
                .iter()
                .find(|s| s.name == name)
                .unwrap()
                .clone()
        };

        let q = spec_for("transformer/layer_0/attention_layer/query/kernel");
        assert_eq!(
            q.layout.specs(),
            &[
                Sharding::Unsharded,
                Sharding::Unsharded,
                Sharding::dim("model")
            ]
        );
        assert_eq!(q.shape, vec![8, 2, 4]);

        let qb = spec_for("transformer/layer_0/attention_layer/query/bias");
        assert_eq!(
            qb.layout.specs(),
            &[Sharding::dim("model"), Sharding::Unsharded]
        );

        let pooler = spec_for("pooler_transform/kernel");
        assert_eq!(
            pooler.layout.specs(),
            &[Sharding::Unsharded, Sharding::dim("model")]
        );

        let ffn = spec_for("transformer/layer_0/output_dense/kernel");
        assert_eq!(
            ffn.layout.specs(),
            &[Sharding::dim("model"), Sharding::Unsharded]
        );

        // Unmatched weights fall back to replication.
        let emb = spec_for("word_embeddings/embeddings");
        assert!(emb.layout.is_fully_replicated());
        let logits = spec_for("logits/kernel");
        assert!(logits.layout.is_fully_replicated());
    }

    #[test]
    fn test_forward_shapes() {
        let model = tiny_model();
        let (batch, seq) = (2, 4);

        let ids = Tensor::new(vec![1u32; batch * seq], [batch, seq]).unwrap();
        let types = Tensor::new(vec![0u32; batch * seq], [batch, seq]).unwrap();

        let logits = model
            .forward(&ids, &ones_mask(batch, seq), &types)
            .unwrap();
        assert_eq!(logits.data.shape(), &[batch, 2]);
        assert!(logits.data.data().iter().all(|x| x.is_finite()));
    }

    #[test]
    fn test_mask_blocks_attention() {
        // Changing a masked-out token must not change the logits.
        let model = tiny_model();
        let (batch, seq) = (1, 4);

        let mut mask = vec![1u32; seq];
        mask[3] = 0;
        let mask = Tensor::new(mask, [batch, seq]).unwrap();
        let types = Tensor::new(vec![0u32; seq], [batch, seq]).unwrap();

        let ids_a = Tensor::new(vec![1, 2, 3, 4u32], [batch, seq]).unwrap();
        let ids_b = Tensor::new(vec![1, 2, 3, 9u32], [batch, seq]).unwrap();

        let out_a = model.forward(&ids_a, &mask, &types).unwrap();
        let out_b = model.forward(&ids_b, &mask, &types).unwrap();

        // The masked position still feeds its own query row, but the CLS
        // pooling only reads position 0, which cannot attend to it.
        for (a, b) in out_a.data.data().iter().zip(out_b.data.data().iter()) {
            assert!((a - b).abs() < 1e-5, "{a} vs {b}");
        }
    }

    #[test]
    fn test_gradients_flow_to_all_weights() {
        let model = tiny_model();
        let (batch, seq) = (2, 4);

        let ids = Tensor::new(vec![3u32; batch * seq], [batch, seq]).unwrap();
        let types = Tensor::new(vec![1u32; batch * seq], [batch, seq]).unwrap();

        let logits = model
            .forward(&ids, &ones_mask(batch, seq), &types)
            .unwrap();
        let loss = crate::loss::sparse_categorical_cross_entropy(&logits, &[0, 1]).unwrap();
        loss.backward();

        assert!(model.word_embeddings.table.grad.borrow().is_some());
        assert!(model.position_embeddings.grad.borrow().is_some());
        assert!(model.layers[0].attention.query_kernel.grad.borrow().is_some());
        assert!(model.layers[0].output_dense.kernel.grad.borrow().is_some());
        assert!(model.pooler_transform.kernel.grad.borrow().is_some());
        assert!(model.logits.bias.grad.borrow().is_some());
    }

    #[test]
    fn test_apply_gradients_and_zero() {
        let mut model = tiny_model();
        let (batch, seq) = (2, 4);

        let ids = Tensor::new(vec![3u32; batch * seq], [batch, seq]).unwrap();
        let types = Tensor::new(vec![0u32; batch * seq], [batch, seq]).unwrap();

        let logits = model
            .forward(&ids, &ones_mask(batch, seq), &types)
            .unwrap();
        let loss = crate::loss::sparse_categorical_cross_entropy(&logits, &[0, 1]).unwrap();
        loss.backward();

        let before = model.logits.kernel.data.data().to_vec();
        let mut sgd = Sgd::new(0.1);
        model.apply_gradients(&mut sgd).unwrap();
        assert_ne!(model.logits.kernel.data.data(), &before[..]);

        model.zero_grad();
        assert!(model.logits.kernel.grad.borrow().is_none());
        assert!(model.layers[0].attention.query_kernel.grad.borrow().is_none());
    }

    #[test]
    fn test_flatten_restore_roundtrip() {
        let model = tiny_model();
        let flat = model.flattened_weights().unwrap();

        // 5 embedding weights + 16 per layer + 4 head weights.
        assert_eq!(flat.len(), 5 + 16 * model.config.num_layers + 4);

        let mut other = tiny_model();
        // Perturb, then restore.
        other.logits.kernel.data.data_mut()[0] += 1.0;
        let map: HashMap<String, Tensor<f32, 1, Cpu>> = flat.into_iter().collect();
        other.load_flattened_weights(&map).unwrap();

        assert_eq!(
            other.logits.kernel.data.data(),
            model.logits.kernel.data.data()
        );
    }

    #[test]
    fn test_indivisible_weight_rejected() {
        // A pooler kernel whose columns cannot split across the model
        // dimension fails layout validation at construction.
        let mesh = demo_mesh();
        let map = model_parallel_layout_map("model").unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let mut config = tiny_config();
        config.hidden = 6;
        config.num_heads = 2; // head_dim 3: q kernel [6, 2, 3], 3 % 2 != 0

        let err = BertClassifier::<f32>::new(config, &mesh, &map, &mut rng);
        assert!(err.is_err());
    }
}
