use anyhow::bail;
use clap::Parser;
use log::info;
use ouija::candle_core::Device;
use ouija::common_io::{read_dense_tsv, read_lines};
use ouija::posterior::{
    write_gene_behaviour_parquet, write_gene_behaviour_tsv, write_pseudotime_parquet,
    write_pseudotime_tsv,
};
use ouija::{FitOptions, Ouija};

#[derive(Parser, Debug, Clone)]
pub struct FitArgs {
    /// expression matrix (cells x genes), dense TSV, plain or gzipped
    #[arg(required = true)]
    data_file: Box<str>,

    /// gene names, one per line; defaults to the column index
    #[arg(long, short = 'g')]
    gene_file: Option<Box<str>>,

    /// cell names, one per line; defaults to the row index
    #[arg(long, short = 'c')]
    cell_file: Option<Box<str>>,

    /// optimization iterations
    #[arg(long, default_value_t = 1000)]
    iter: usize,

    /// learning rate
    #[arg(long, default_value_t = 0.01)]
    learning_rate: f32,

    /// Monte-Carlo samples per ELBO evaluation
    #[arg(long, short = 's', default_value_t = 10)]
    num_samples: usize,

    /// stream a per-iteration ELBO trace into this directory
    #[arg(long)]
    logdir: Option<Box<str>>,

    /// also write `.tsv.gz` tables next to the parquet files
    #[arg(long, default_value_t = false)]
    save_tsv: bool,

    /// Output header
    #[arg(long, short, required = true)]
    out: Box<str>,

    /// verbosity
    #[arg(long, short)]
    verbose: bool,
}

pub fn run_fit_pseudotime(args: FitArgs) -> anyhow::Result<()> {
    env_logger::init();

    let device = Device::Cpu;
    let y = read_dense_tsv(&args.data_file, &device)?;
    let (num_cells, num_genes) = y.dims2()?;
    info!(
        "read {} cells x {} genes from {}",
        num_cells, num_genes, &args.data_file
    );

    let gene_names = match &args.gene_file {
        Some(file) => Some(read_lines(file)?),
        None => None,
    };
    if let Some(names) = &gene_names {
        if names.len() != num_genes {
            bail!("{} gene names for {} genes", names.len(), num_genes);
        }
    }
    let cell_names = match &args.cell_file {
        Some(file) => Some(read_lines(file)?),
        None => None,
    };
    if let Some(names) = &cell_names {
        if names.len() != num_cells {
            bail!("{} cell names for {} cells", names.len(), num_cells);
        }
    }

    let options = FitOptions {
        n_iter: args.iter,
        learning_rate: args.learning_rate,
        num_samples: args.num_samples,
        logdir: args.logdir.clone(),
        verbose: args.verbose,
    };

    let mut model = Ouija::new(options, device);
    model.fit(&y)?;

    let trace = model.elbo_trace()?;
    if let Some(last) = trace.last() {
        info!("optimization finished, final ELBO {:.4}", last);
    }

    let pseudotime = model.trajectory()?;
    let behaviour = model.gene_behaviour()?;

    let output = args.out.clone();
    let pt_parquet = output.to_string() + ".pseudotime.parquet";
    let gene_parquet = output.to_string() + ".gene_behaviour.parquet";

    write_pseudotime_parquet(&pseudotime, cell_names.as_deref(), &pt_parquet)?;
    write_gene_behaviour_parquet(&behaviour, gene_names.as_deref(), &gene_parquet)?;
    info!("wrote {} and {}", pt_parquet, gene_parquet);

    if args.save_tsv {
        let pt_tsv = output.to_string() + ".pseudotime.tsv.gz";
        let gene_tsv = output.to_string() + ".gene_behaviour.tsv.gz";
        write_pseudotime_tsv(&pseudotime, cell_names.as_deref(), &pt_tsv)?;
        write_gene_behaviour_tsv(&behaviour, gene_names.as_deref(), &gene_tsv)?;
        info!("wrote {} and {}", pt_tsv, gene_tsv);
    }

    info!("Done");
    Ok(())
}
