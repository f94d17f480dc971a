//! Posterior summaries of a fitted model and table export.
//!
//! The point estimates come straight from the variational locations:
//! pseudotimes are the bijector-forwarded `qz` locations and the
//! per-gene table reports switch strength, switch time, and baseline
//! expression with one-posterior-sd bands. Bands are formed in
//! unconstrained space and then mapped through the bijector, so
//! constrained columns always respect their support.

use crate::bijector::Bijector;
use crate::common_io::write_lines;
use crate::variational::{ApproxDists, VariationalApprox};
use anyhow::Result;
use parquet::data_type::ByteArray;

/// One row of the gene behaviour table.
#[derive(Clone, Debug)]
pub struct GeneBehaviour {
    pub gene: usize,
    pub k_mean: f32,
    pub k_lower: f32,
    pub k_upper: f32,
    pub t0_mean: f32,
    pub t0_lower: f32,
    pub t0_upper: f32,
    pub mu0_mean: f32,
}

/// Posterior pseudotime point estimate per cell, each in `(0, 1)`.
pub fn pseudotime_vector(approx: &ApproxDists) -> Result<Vec<f32>> {
    Ok(approx
        .z
        .constrained_value()?
        .flatten_all()?
        .to_vec1::<f32>()?)
}

/// Summarize the switching behaviour of every gene.
pub fn gene_behaviour_table(approx: &ApproxDists) -> Result<Vec<GeneBehaviour>> {
    let (k_loc, k_sd) = approx.k.unconstrained_params()?;
    let k_mean = k_loc.flatten_all()?.to_vec1::<f32>()?;
    let k_sd = k_sd.flatten_all()?.to_vec1::<f32>()?;

    let (t0_loc, t0_sd) = approx.t0.unconstrained_params()?;
    let bij = approx.t0.bijector();
    let t0_mean = bij.forward(&t0_loc)?.to_vec1::<f32>()?;
    let t0_lower = bij.forward(&(&t0_loc - &t0_sd)?)?.to_vec1::<f32>()?;
    let t0_upper = bij.forward(&(&t0_loc + &t0_sd)?)?.to_vec1::<f32>()?;

    let mu0_mean = approx.mu0.constrained_value()?.to_vec1::<f32>()?;

    let num_genes = k_mean.len();
    let mut rows = Vec::with_capacity(num_genes);
    for j in 0..num_genes {
        rows.push(GeneBehaviour {
            gene: j,
            k_mean: k_mean[j],
            k_lower: k_mean[j] - k_sd[j],
            k_upper: k_mean[j] + k_sd[j],
            t0_mean: t0_mean[j],
            t0_lower: t0_lower[j],
            t0_upper: t0_upper[j],
            mu0_mean: mu0_mean[j],
        });
    }
    Ok(rows)
}

fn index_names(n: usize) -> Vec<Box<str>> {
    (0..n).map(|i| i.to_string().into_boxed_str()).collect()
}

fn check_names(names: &[Box<str>], n: usize, what: &str) -> Result<()> {
    if names.len() != n {
        anyhow::bail!("{} names ({}) do not match rows ({})", what, names.len(), n);
    }
    Ok(())
}

/// Write a parquet table with one UTF-8 key column followed by float
/// columns, one row group, ZSTD-compressed.
fn write_keyed_float_table(
    file_path: &str,
    schema_name: &str,
    key_column: (&str, &[ByteArray]),
    value_columns: &[(&str, Vec<f32>)],
) -> Result<()> {
    use parquet::basic::{Compression, ConvertedType, Repetition, Type as PhysicalType, ZstdLevel};
    use parquet::data_type::{ByteArrayType, FloatType};
    use parquet::file::properties::WriterProperties;
    use parquet::file::writer::SerializedFileWriter;
    use parquet::schema::types::Type;
    use std::sync::Arc;

    let (key_name, keys) = key_column;

    let mut fields = vec![Arc::new(
        Type::primitive_type_builder(key_name, PhysicalType::BYTE_ARRAY)
            .with_repetition(Repetition::REQUIRED)
            .with_converted_type(ConvertedType::UTF8)
            .build()?,
    )];
    for (name, _) in value_columns {
        fields.push(Arc::new(
            Type::primitive_type_builder(name, PhysicalType::FLOAT)
                .with_repetition(Repetition::REQUIRED)
                .build()?,
        ));
    }
    let schema = Arc::new(
        Type::group_type_builder(schema_name)
            .with_fields(fields)
            .build()?,
    );

    let zstd = ZstdLevel::try_new(5)?;
    let props = Arc::new(
        WriterProperties::builder()
            .set_compression(Compression::ZSTD(zstd))
            .build(),
    );

    let file = std::fs::File::create(file_path)?;
    let mut writer = SerializedFileWriter::new(file, schema, props)?;
    let mut row_group = writer.next_row_group()?;

    if let Some(mut column) = row_group.next_column()? {
        column
            .typed::<ByteArrayType>()
            .write_batch(keys, None, None)?;
        column.close()?;
    }
    for (_, values) in value_columns {
        if let Some(mut column) = row_group.next_column()? {
            column.typed::<FloatType>().write_batch(values, None, None)?;
            column.close()?;
        }
    }
    row_group.close()?;
    writer.close()?;
    Ok(())
}

/// Gene behaviour table as parquet; rows keyed by `gene_names` when
/// given, by gene index otherwise.
pub fn write_gene_behaviour_parquet(
    rows: &[GeneBehaviour],
    gene_names: Option<&[Box<str>]>,
    file_path: &str,
) -> Result<()> {
    let fallback = index_names(rows.len());
    let names = match gene_names {
        Some(names) => {
            check_names(names, rows.len(), "gene")?;
            names
        }
        None => fallback.as_slice(),
    };
    let keys: Vec<ByteArray> = names.iter().map(|n| ByteArray::from(n.as_ref())).collect();

    let columns: Vec<(&str, Vec<f32>)> = vec![
        ("k_mean", rows.iter().map(|r| r.k_mean).collect()),
        ("k_lower", rows.iter().map(|r| r.k_lower).collect()),
        ("k_upper", rows.iter().map(|r| r.k_upper).collect()),
        ("t0_mean", rows.iter().map(|r| r.t0_mean).collect()),
        ("t0_lower", rows.iter().map(|r| r.t0_lower).collect()),
        ("t0_upper", rows.iter().map(|r| r.t0_upper).collect()),
        ("mu0_mean", rows.iter().map(|r| r.mu0_mean).collect()),
    ];
    write_keyed_float_table(file_path, "gene_behaviour", ("gene", &keys), &columns)
}

/// Pseudotime vector as parquet; rows keyed by `cell_names` when given.
pub fn write_pseudotime_parquet(
    pseudotime: &[f32],
    cell_names: Option<&[Box<str>]>,
    file_path: &str,
) -> Result<()> {
    let fallback = index_names(pseudotime.len());
    let names = match cell_names {
        Some(names) => {
            check_names(names, pseudotime.len(), "cell")?;
            names
        }
        None => fallback.as_slice(),
    };
    let keys: Vec<ByteArray> = names.iter().map(|n| ByteArray::from(n.as_ref())).collect();
    let columns = vec![("pseudotime", pseudotime.to_vec())];
    write_keyed_float_table(file_path, "pseudotime", ("cell", &keys), &columns)
}

/// Same table as a TSV (gz by extension), one header line.
pub fn write_gene_behaviour_tsv(
    rows: &[GeneBehaviour],
    gene_names: Option<&[Box<str>]>,
    file_path: &str,
) -> Result<()> {
    if let Some(names) = gene_names {
        check_names(names, rows.len(), "gene")?;
    }
    let mut lines: Vec<Box<str>> = Vec::with_capacity(rows.len() + 1);
    lines.push("gene\tk_mean\tk_lower\tk_upper\tt0_mean\tt0_lower\tt0_upper\tmu0_mean".into());
    for (j, r) in rows.iter().enumerate() {
        let name = match gene_names {
            Some(names) => names[j].to_string(),
            None => r.gene.to_string(),
        };
        lines.push(
            format!(
                "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                name,
                r.k_mean,
                r.k_lower,
                r.k_upper,
                r.t0_mean,
                r.t0_lower,
                r.t0_upper,
                r.mu0_mean
            )
            .into_boxed_str(),
        );
    }
    write_lines(&lines, file_path)
}

/// Pseudotime vector as a TSV (gz by extension), one header line.
pub fn write_pseudotime_tsv(
    pseudotime: &[f32],
    cell_names: Option<&[Box<str>]>,
    file_path: &str,
) -> Result<()> {
    if let Some(names) = cell_names {
        check_names(names, pseudotime.len(), "cell")?;
    }
    let mut lines: Vec<Box<str>> = Vec::with_capacity(pseudotime.len() + 1);
    lines.push("cell\tpseudotime".into());
    for (j, t) in pseudotime.iter().enumerate() {
        let name = match cell_names {
            Some(names) => names[j].to_string(),
            None => j.to_string(),
        };
        lines.push(format!("{}\t{}", name, t).into_boxed_str());
    }
    write_lines(&lines, file_path)
}
