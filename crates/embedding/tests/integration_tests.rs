//! End-to-end checks for the combined token and position embedding.

use anyhow::Result;
use candle_core::{DType, Device};
use embedding::{
    Embedding, EmbeddingConfig, EmbeddingError, EmbeddingTable, LearnedPositions,
};
use layers::{Axis, NamedTensor, PrngKey};

fn config() -> EmbeddingConfig {
    EmbeddingConfig {
        vocab_size: 8,
        embedding_size: 4,
        max_sequence_length: 6,
        initializer_range: 0.02,
    }
}

#[test]
fn embed_sums_token_and_position_rows() -> Result<()> {
    let device = Device::Cpu;
    let embedding = Embedding::init(&config(), PrngKey::new(0), &device, DType::F32)?;
    let pos = Axis::new("position", 3);
    let ids = NamedTensor::from_vec(vec![5u32, 0, 7], &[pos.clone()], &device)?;
    let out = embedding.embed(&pos, &ids)?;
    let embed = embedding.embed_axis().clone();
    assert_eq!(out.axes(), &[pos.clone(), embed.clone()]);

    for (p, id) in [5usize, 0, 7].into_iter().enumerate() {
        let token = embedding.token_table().weight().index(embedding.vocab_axis(), id)?;
        let position = embedding
            .position_table()
            .table()
            .weight()
            .index(&config().max_position_axis(), p)?;
        let expected = token.add(&position)?;
        assert!(out.index(&pos, p)?.max_abs_diff(&expected)? < 1e-6);
    }
    Ok(())
}

#[test]
fn batch_axis_flows_through_embedding() -> Result<()> {
    let device = Device::Cpu;
    let embedding = Embedding::init(&config(), PrngKey::new(3), &device, DType::F32)?;
    let batch = Axis::new("batch", 2);
    let pos = Axis::new("position", 2);
    let ids = NamedTensor::from_vec(vec![1u32, 2, 3, 4], &[batch.clone(), pos.clone()], &device)?;
    let out = embedding.embed(&pos, &ids)?;
    assert_eq!(out.axes(), &[batch.clone(), pos.clone(), embedding.embed_axis().clone()]);

    let second = NamedTensor::from_vec(vec![3u32, 4], &[pos.clone()], &device)?;
    let single = embedding.embed(&pos, &second)?;
    assert!(out.index(&batch, 1)?.max_abs_diff(&single)? < 1e-6);
    Ok(())
}

#[test]
fn unembed_uses_exact_transpose_of_token_table() -> Result<()> {
    let device = Device::Cpu;
    let vocab = Axis::new("vocab", 5);
    let embed = Axis::new("embedding", 3);
    let max_position = Axis::new("max_position", 4);
    let table = EmbeddingTable::from_weight(
        NamedTensor::from_vec(
            vec![
                1f32, 0., 0., //
                0., 1., 0., //
                0., 0., 1., //
                0.6, 0.8, 0., //
                0., 0.6, 0.8,
            ],
            &[vocab.clone(), embed.clone()],
            &device,
        )?,
        &vocab,
        &embed,
    )?;
    let zeros = NamedTensor::zeros(&[max_position.clone(), embed.clone()], DType::F32, &device)?;
    let positions = LearnedPositions::from_table(EmbeddingTable::from_weight(zeros, &max_position, &embed)?);
    let embedding = Embedding::from_parts(table.clone(), positions)?;

    let pos = Axis::new("position", 1);
    let ids = NamedTensor::from_vec(vec![3u32], &[pos.clone()], &device)?;
    let logits = embedding.unembed(&embedding.embed(&pos, &ids)?)?;

    // table @ table[3]
    let row = table.weight().index(&vocab, 3)?;
    let expected = table.weight().dot(&[embed], &row)?;
    let got = logits.index(&pos, 0)?;
    assert_eq!(got.axes(), &[vocab]);
    assert!(got.max_abs_diff(&expected)? < 1e-6);
    assert!((got.to_vec_f32(got.axes())?[3] - 1.0).abs() < 1e-6);
    Ok(())
}

#[test]
fn sequence_longer_than_table_is_rejected() -> Result<()> {
    let device = Device::Cpu;
    let embedding = Embedding::init(&config(), PrngKey::new(0), &device, DType::F32)?;
    let pos = Axis::new("position", 7);
    let ids = NamedTensor::zeros(&[pos.clone()], DType::U32, &device)?;
    let err = embedding.embed(&pos, &ids).unwrap_err();
    assert!(matches!(
        err,
        EmbeddingError::SequenceLengthExceeded { length: 7, max: 6 }
    ));
    Ok(())
}

#[test]
fn init_splits_token_and_position_keys() -> Result<()> {
    let device = Device::Cpu;
    let a = Embedding::init(&config(), PrngKey::new(11), &device, DType::F32)?;
    let b = Embedding::init(&config(), PrngKey::new(11), &device, DType::F32)?;
    assert_eq!(a.token_table().weight().max_abs_diff(b.token_table().weight())?, 0.0);

    let [token_key, _] = PrngKey::new(11).split_array();
    let token = EmbeddingTable::init(
        &config().vocab_axis(),
        &config().embed_axis(),
        0.02,
        token_key,
        &device,
        DType::F32,
    )?;
    assert_eq!(a.token_table().weight().max_abs_diff(token.weight())?, 0.0);

    let leading_token_rows = a.token_table().weight().index(&config().vocab_axis(), 0)?;
    let leading_position_rows = a
        .position_table()
        .table()
        .weight()
        .index(&config().max_position_axis(), 0)?;
    assert!(leading_token_rows.max_abs_diff(&leading_position_rows)? > 0.0);
    assert_eq!(a.parameter_count(), 8 * 4 + 6 * 4);
    Ok(())
}
