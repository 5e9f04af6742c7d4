//! Sentence embedding model using Hugging Face Candle
//!
//! A BERT encoder with masked mean pooling and L2 normalisation, the recipe
//! used by sentence-transformers checkpoints such as all-MiniLM-L6-v2.

use anyhow::{anyhow, Context, Result};
use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{embedding, layer_norm, linear, Activation, Embedding, LayerNorm, Linear, VarBuilder};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokenizers::{PaddingParams, Tokenizer, TruncationParams};

use super::{Embedder, EmbeddingVector};
use crate::config::ModelSource;

/// Token budget per text; issue bodies beyond it are truncated
pub const MAX_SEQ_LEN: usize = 256;

/// Texts encoded per forward pass
const BATCH_SIZE: usize = 32;

fn default_hidden_act() -> String {
    "gelu".to_string()
}

fn default_type_vocab_size() -> usize {
    2
}

fn default_layer_norm_eps() -> f64 {
    1e-12
}

/// Model configuration loaded from config.json
#[derive(Debug, Clone, Deserialize)]
pub struct BertConfig {
    pub vocab_size: usize,
    pub hidden_size: usize,
    pub num_hidden_layers: usize,
    pub num_attention_heads: usize,
    pub intermediate_size: usize,
    #[serde(default = "default_hidden_act")]
    pub hidden_act: String,
    pub max_position_embeddings: usize,
    #[serde(default = "default_type_vocab_size")]
    pub type_vocab_size: usize,
    #[serde(default = "default_layer_norm_eps")]
    pub layer_norm_eps: f64,
}

impl Default for BertConfig {
    fn default() -> Self {
        // all-MiniLM-L6-v2
        Self {
            vocab_size: 30522,
            hidden_size: 384,
            num_hidden_layers: 6,
            num_attention_heads: 12,
            intermediate_size: 1536,
            hidden_act: default_hidden_act(),
            max_position_embeddings: 512,
            type_vocab_size: default_type_vocab_size(),
            layer_norm_eps: default_layer_norm_eps(),
        }
    }
}

impl BertConfig {
    fn activation(&self) -> Activation {
        match self.hidden_act.as_str() {
            "relu" => Activation::Relu,
            "gelu_new" | "gelu_pytorch_tanh" => Activation::NewGelu,
            _ => Activation::Gelu,
        }
    }

    /// Longest sequence the position table can address, capped at [`MAX_SEQ_LEN`]
    pub fn max_tokens(&self) -> usize {
        self.max_position_embeddings.min(MAX_SEQ_LEN)
    }
}

/// BERT embeddings layer (word + position + token type)
struct BertEmbeddings {
    word_embeddings: Embedding,
    position_embeddings: Embedding,
    token_type_embeddings: Embedding,
    layer_norm: LayerNorm,
}

impl BertEmbeddings {
    fn load(vb: VarBuilder, config: &BertConfig) -> Result<Self> {
        Ok(Self {
            word_embeddings: embedding(
                config.vocab_size,
                config.hidden_size,
                vb.pp("word_embeddings"),
            )?,
            position_embeddings: embedding(
                config.max_position_embeddings,
                config.hidden_size,
                vb.pp("position_embeddings"),
            )?,
            token_type_embeddings: embedding(
                config.type_vocab_size,
                config.hidden_size,
                vb.pp("token_type_embeddings"),
            )?,
            layer_norm: layer_norm(config.hidden_size, config.layer_norm_eps, vb.pp("LayerNorm"))?,
        })
    }

    /// `input_ids` and `token_type_ids` are `[batch, seq]`
    fn forward(&self, input_ids: &Tensor, token_type_ids: &Tensor) -> Result<Tensor> {
        let (_batch, seq_len) = input_ids.dims2()?;
        let position_ids = Tensor::arange(0u32, seq_len as u32, input_ids.device())?;

        let words = self.word_embeddings.forward(input_ids)?;
        let types = self.token_type_embeddings.forward(token_type_ids)?;
        let positions = self.position_embeddings.forward(&position_ids)?;

        let embeddings = (words + types)?.broadcast_add(&positions)?;
        Ok(self.layer_norm.forward(&embeddings)?)
    }
}

/// Multi-head self-attention
struct BertSelfAttention {
    query: Linear,
    key: Linear,
    value: Linear,
    num_heads: usize,
    head_size: usize,
}

impl BertSelfAttention {
    fn load(vb: VarBuilder, config: &BertConfig) -> Result<Self> {
        let head_size = config.hidden_size / config.num_attention_heads;
        let all_head_size = config.num_attention_heads * head_size;

        Ok(Self {
            query: linear(config.hidden_size, all_head_size, vb.pp("query"))?,
            key: linear(config.hidden_size, all_head_size, vb.pp("key"))?,
            value: linear(config.hidden_size, all_head_size, vb.pp("value"))?,
            num_heads: config.num_attention_heads,
            head_size,
        })
    }

    /// `[batch, seq, hidden]` -> `[batch, heads, seq, head_size]`
    fn split_heads(&self, x: &Tensor) -> Result<Tensor> {
        let (batch, seq_len, _) = x.dims3()?;
        Ok(x
            .reshape((batch, seq_len, self.num_heads, self.head_size))?
            .transpose(1, 2)?
            .contiguous()?)
    }

    fn forward(&self, hidden_states: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
        let query = self.split_heads(&self.query.forward(hidden_states)?)?;
        let key = self.split_heads(&self.key.forward(hidden_states)?)?;
        let value = self.split_heads(&self.value.forward(hidden_states)?)?;

        let scores = query.matmul(&key.t()?.contiguous()?)?;
        let scores = (scores / (self.head_size as f64).sqrt())?;
        let scores = scores.broadcast_add(attention_mask)?;

        let probs = candle_nn::ops::softmax_last_dim(&scores)?;
        let context = probs.matmul(&value)?;

        let (batch, _, seq_len, _) = context.dims4()?;
        Ok(context
            .transpose(1, 2)?
            .contiguous()?
            .reshape((batch, seq_len, self.num_heads * self.head_size))?)
    }
}

/// Dense + residual + layer norm, shared by the attention and FFN outputs
struct BertResidualOutput {
    dense: Linear,
    layer_norm: LayerNorm,
}

impl BertResidualOutput {
    fn load(vb: VarBuilder, in_dim: usize, config: &BertConfig) -> Result<Self> {
        Ok(Self {
            dense: linear(in_dim, config.hidden_size, vb.pp("dense"))?,
            layer_norm: layer_norm(config.hidden_size, config.layer_norm_eps, vb.pp("LayerNorm"))?,
        })
    }

    fn forward(&self, hidden_states: &Tensor, input_tensor: &Tensor) -> Result<Tensor> {
        let hidden_states = self.dense.forward(hidden_states)?;
        Ok(self.layer_norm.forward(&(hidden_states + input_tensor)?)?)
    }
}

/// One transformer block
struct BertLayer {
    attention: BertSelfAttention,
    attention_output: BertResidualOutput,
    intermediate: Linear,
    activation: Activation,
    output: BertResidualOutput,
}

impl BertLayer {
    fn load(vb: VarBuilder, config: &BertConfig) -> Result<Self> {
        let attention_vb = vb.pp("attention");
        Ok(Self {
            attention: BertSelfAttention::load(attention_vb.pp("self"), config)?,
            attention_output: BertResidualOutput::load(
                attention_vb.pp("output"),
                config.hidden_size,
                config,
            )?,
            intermediate: linear(
                config.hidden_size,
                config.intermediate_size,
                vb.pp("intermediate").pp("dense"),
            )?,
            activation: config.activation(),
            output: BertResidualOutput::load(vb.pp("output"), config.intermediate_size, config)?,
        })
    }

    fn forward(&self, hidden_states: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
        let attended = self.attention.forward(hidden_states, attention_mask)?;
        let attended = self.attention_output.forward(&attended, hidden_states)?;

        let intermediate = self.activation.forward(&self.intermediate.forward(&attended)?)?;
        self.output.forward(&intermediate, &attended)
    }
}

/// Embeddings followed by the encoder stack
struct BertModel {
    embeddings: BertEmbeddings,
    layers: Vec<BertLayer>,
}

impl BertModel {
    fn load(vb: VarBuilder, config: &BertConfig) -> Result<Self> {
        let embeddings = BertEmbeddings::load(vb.pp("embeddings"), config)?;

        let layer_vb = vb.pp("encoder").pp("layer");
        let layers = (0..config.num_hidden_layers)
            .map(|i| BertLayer::load(layer_vb.pp(i), config))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { embeddings, layers })
    }

    fn forward(
        &self,
        input_ids: &Tensor,
        token_type_ids: &Tensor,
        attention_mask: &Tensor,
    ) -> Result<Tensor> {
        let mask = extended_attention_mask(attention_mask)?;
        let mut hidden_states = self.embeddings.forward(input_ids, token_type_ids)?;
        for layer in &self.layers {
            hidden_states = layer.forward(&hidden_states, &mask)?;
        }
        Ok(hidden_states)
    }
}

/// `[batch, seq]` 0/1 mask -> additive `[batch, 1, 1, seq]` mask
fn extended_attention_mask(attention_mask: &Tensor) -> Result<Tensor> {
    let (batch, seq_len) = attention_mask.dims2()?;
    let mask = attention_mask.to_dtype(DType::F32)?;
    // (1 - mask) * -10000: 0 where attended, large negative on padding
    let mask = (mask.affine(-1.0, 1.0)? * -10_000.0)?;
    Ok(mask.reshape((batch, 1, 1, seq_len))?)
}

/// Average token states over non-padding positions
fn mean_pooling(hidden_states: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let mask = attention_mask.to_dtype(DType::F32)?.unsqueeze(2)?;
    let summed = hidden_states.broadcast_mul(&mask)?.sum(1)?;
    let counts = mask.sum(1)?.maximum(1e-9)?;
    Ok(summed.broadcast_div(&counts)?)
}

/// Row-wise L2 normalisation of a `[batch, hidden]` tensor
fn l2_normalize(tensor: &Tensor) -> Result<Tensor> {
    let norm = tensor.sqr()?.sum_keepdim(1)?.sqrt()?.maximum(1e-12)?;
    Ok(tensor.broadcast_div(&norm)?)
}

/// Paths of the three files a checkpoint needs
struct ModelFiles {
    config: PathBuf,
    tokenizer: PathBuf,
    weights: PathBuf,
}

impl ModelFiles {
    fn resolve(source: &ModelSource) -> Result<Self> {
        match source {
            ModelSource::Local(dir) => Self::local(dir),
            ModelSource::Hub { repo_id } => {
                use hf_hub::api::sync::Api;

                tracing::info!(model = %repo_id, "fetching model from Hugging Face Hub");
                let api = Api::new().context("initialising Hugging Face Hub client")?;
                let repo = api.model(repo_id.clone());

                Ok(Self {
                    config: repo.get("config.json").context("downloading config.json")?,
                    tokenizer: repo
                        .get("tokenizer.json")
                        .context("downloading tokenizer.json")?,
                    weights: repo
                        .get("model.safetensors")
                        .context("downloading model.safetensors")?,
                })
            }
        }
    }

    fn local(dir: &Path) -> Result<Self> {
        let files = Self {
            config: dir.join("config.json"),
            tokenizer: dir.join("tokenizer.json"),
            weights: dir.join("model.safetensors"),
        };
        for path in [&files.config, &files.tokenizer, &files.weights] {
            if !path.exists() {
                return Err(anyhow!("model file not found at {}", path.display()));
            }
        }
        Ok(files)
    }
}

/// Sentence embedding model backed by a BERT checkpoint
pub struct SentenceEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dimension: usize,
}

impl SentenceEmbedder {
    /// Load a checkpoint from the Hub cache or a local directory.
    ///
    /// The directory (or Hub repository) must contain:
    ///   - `config.json` - The model configuration
    ///   - `tokenizer.json` - The tokenizer configuration
    ///   - `model.safetensors` - The model weights
    pub fn load(source: &ModelSource) -> Result<Self> {
        let files = ModelFiles::resolve(source)?;

        // Determine device (prefer CUDA if available)
        let device = if candle_core::utils::cuda_is_available() {
            Device::new_cuda(0)?
        } else if candle_core::utils::metal_is_available() {
            Device::new_metal(0)?
        } else {
            Device::Cpu
        };

        tracing::info!(model = %source, device = ?device, "loading embedding model");

        let config_str = std::fs::read_to_string(&files.config)
            .with_context(|| format!("reading {}", files.config.display()))?;
        let config: BertConfig = serde_json::from_str(&config_str)
            .map_err(|e| anyhow!("failed to parse config.json: {}", e))?;

        tracing::debug!(
            layers = config.num_hidden_layers,
            hidden = config.hidden_size,
            heads = config.num_attention_heads,
            "loaded model config"
        );

        let mut tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| anyhow!("failed to load tokenizer: {}", e))?;
        tokenizer.with_padding(Some(PaddingParams::default()));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: config.max_tokens(),
                ..Default::default()
            }))
            .map_err(|e| anyhow!("failed to configure truncation: {}", e))?;

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[&files.weights], DType::F32, &device)?
        };

        // Raw BERT checkpoints prefix every tensor with "bert."; sentence-transformers
        // exports do not.
        let model = match BertModel::load(vb.clone(), &config) {
            Ok(model) => model,
            Err(plain_err) => BertModel::load(vb.pp("bert"), &config)
                .map_err(|_| plain_err)
                .context("loading model weights")?,
        };

        tracing::info!(dimension = config.hidden_size, "embedding model ready");

        Ok(Self {
            model,
            tokenizer,
            device,
            dimension: config.hidden_size,
        })
    }

    /// Embedding dimension
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Device the model is running on
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Encode one padded batch
    fn embed_chunk(&self, texts: &[&str]) -> Result<Vec<EmbeddingVector>> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow!("tokenization failed: {}", e))?;

        let stack = |rows: Vec<&[u32]>| -> Result<Tensor> {
            let rows = rows
                .into_iter()
                .map(|row| Tensor::new(row, &self.device))
                .collect::<candle_core::Result<Vec<_>>>()?;
            Ok(Tensor::stack(&rows, 0)?)
        };

        let input_ids = stack(encodings.iter().map(|e| e.get_ids()).collect())?;
        let token_type_ids = stack(encodings.iter().map(|e| e.get_type_ids()).collect())?;
        let attention_mask = stack(encodings.iter().map(|e| e.get_attention_mask()).collect())?;

        let hidden_states = self
            .model
            .forward(&input_ids, &token_type_ids, &attention_mask)?;
        let pooled = mean_pooling(&hidden_states, &attention_mask)?;
        let normalized = l2_normalize(&pooled)?;

        Ok(normalized.to_vec2::<f32>()?)
    }
}

impl Embedder for SentenceEmbedder {
    fn embed(&self, texts: &[&str]) -> Result<Vec<EmbeddingVector>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(BATCH_SIZE) {
            vectors.extend(self.embed_chunk(chunk)?);
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_minilm() {
        let config = BertConfig::default();
        assert_eq!(config.hidden_size, 384);
        assert_eq!(config.num_hidden_layers, 6);
        assert_eq!(config.max_tokens(), MAX_SEQ_LEN);
    }

    #[test]
    fn test_config_parses_minimal_json() {
        let json = r#"{
            "vocab_size": 30522,
            "hidden_size": 384,
            "num_hidden_layers": 6,
            "num_attention_heads": 12,
            "intermediate_size": 1536,
            "max_position_embeddings": 128,
            "architectures": ["BertModel"]
        }"#;
        let config: BertConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.hidden_act, "gelu");
        assert_eq!(config.type_vocab_size, 2);
        assert_eq!(config.max_tokens(), 128);
    }

    #[test]
    fn test_missing_local_files() {
        let dir = tempfile::tempdir().unwrap();
        let err = ModelFiles::local(dir.path()).err().unwrap();
        assert!(err.to_string().contains("config.json"));
    }

    #[test]
    fn test_mean_pooling_ignores_padding() {
        let device = Device::Cpu;
        // one sequence of three tokens, last one padding
        let hidden = Tensor::new(&[[[1f32, 2.0], [3.0, 4.0], [100.0, 100.0]]], &device).unwrap();
        let mask = Tensor::new(&[[1u32, 1, 0]], &device).unwrap();

        let pooled = mean_pooling(&hidden, &mask).unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(pooled, vec![vec![2.0, 3.0]]);
    }

    #[test]
    fn test_l2_normalize_rows() {
        let device = Device::Cpu;
        let t = Tensor::new(&[[3f32, 4.0], [0.0, 0.0]], &device).unwrap();
        let rows = l2_normalize(&t).unwrap().to_vec2::<f32>().unwrap();
        assert!((rows[0][0] - 0.6).abs() < 1e-6);
        assert!((rows[0][1] - 0.8).abs() < 1e-6);
        assert_eq!(rows[1], vec![0.0, 0.0]);
    }

    #[test]
    fn test_attention_mask_is_additive() {
        let device = Device::Cpu;
        let mask = Tensor::new(&[[1u32, 0]], &device).unwrap();
        let extended = extended_attention_mask(&mask).unwrap();
        assert_eq!(extended.dims(), &[1, 1, 1, 2]);
        let values = extended.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(values, vec![0.0, -10_000.0]);
    }

    #[test]
    fn test_tiny_random_model_forward_shapes() {
        let device = Device::Cpu;
        let config = BertConfig {
            vocab_size: 16,
            hidden_size: 8,
            num_hidden_layers: 2,
            num_attention_heads: 2,
            intermediate_size: 16,
            hidden_act: "gelu".into(),
            max_position_embeddings: 8,
            type_vocab_size: 2,
            layer_norm_eps: 1e-12,
        };
        let varmap = candle_nn::VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = BertModel::load(vb, &config).unwrap();

        let ids = Tensor::new(&[[1u32, 2, 3, 0], [4, 5, 0, 0]], &device).unwrap();
        let types = ids.zeros_like().unwrap();
        let mask = Tensor::new(&[[1u32, 1, 1, 0], [1, 1, 0, 0]], &device).unwrap();

        let hidden = model.forward(&ids, &types, &mask).unwrap();
        assert_eq!(hidden.dims(), &[2, 4, 8]);

        let pooled = l2_normalize(&mean_pooling(&hidden, &mask).unwrap()).unwrap();
        for row in pooled.to_vec2::<f32>().unwrap() {
            let norm = row.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-4);
        }
    }
}
