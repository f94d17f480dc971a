use clap::Parser;
use log::info;
use ouija::candle_core::Device;
use ouija::common_io::{write_dense_tsv, write_lines};
use ouija::posterior::write_pseudotime_tsv;
use ouija::{simulate_trajectory, SimOptions};

#[derive(Parser, Debug, Clone)]
pub struct SimulateArgs {
    /// number of cells
    #[arg(short = 'n', long, default_value_t = 200)]
    num_cells: usize,

    /// number of genes
    #[arg(short = 'g', long, default_value_t = 20)]
    num_genes: usize,

    /// smallest switch strength magnitude
    #[arg(long, default_value_t = 5.)]
    min_switch: f32,

    /// largest switch strength magnitude
    #[arg(long, default_value_t = 15.)]
    max_switch: f32,

    /// smallest baseline expression level
    #[arg(long, default_value_t = 1.)]
    min_baseline: f32,

    /// largest baseline expression level
    #[arg(long, default_value_t = 3.)]
    max_baseline: f32,

    /// overdispersion of the detected values
    #[arg(long, default_value_t = 0.5)]
    overdisp: f32,

    /// dropout logit at zero expression
    #[arg(long, default_value_t = -2., allow_hyphen_values = true)]
    dropout_intercept: f32,

    /// change in dropout logit per unit of expression
    #[arg(long, default_value_t = -0.5, allow_hyphen_values = true)]
    dropout_slope: f32,

    /// random seed
    #[arg(long, default_value_t = 42)]
    rseed: u64,

    /// Output header
    #[arg(long, short, required = true)]
    out: Box<str>,
}

pub fn run_simulate_expression(args: SimulateArgs) -> anyhow::Result<()> {
    env_logger::init();

    let opts = SimOptions {
        num_cells: args.num_cells,
        num_genes: args.num_genes,
        switch_strength: (args.min_switch, args.max_switch),
        baseline: (args.min_baseline, args.max_baseline),
        phi: args.overdisp,
        dropout_intercept: args.dropout_intercept,
        dropout_slope: args.dropout_slope,
        rseed: args.rseed,
    };

    info!(
        "simulating {} cells x {} genes (seed {})",
        args.num_cells, args.num_genes, args.rseed
    );
    let sim = simulate_trajectory(&opts, &Device::Cpu)?;

    let output = args.out.clone();
    let expression_file = output.to_string() + ".expression.tsv.gz";
    let pseudotime_file = output.to_string() + ".pseudotime.tsv.gz";
    let genes_file = output.to_string() + ".genes.tsv.gz";

    write_dense_tsv(&sim.expression, &expression_file)?;
    write_pseudotime_tsv(&sim.pseudotime, None, &pseudotime_file)?;

    let mut lines: Vec<Box<str>> = Vec::with_capacity(args.num_genes + 1);
    lines.push("gene\tswitch_strength\tswitch_time\tbaseline".into());
    for j in 0..args.num_genes {
        lines.push(
            format!(
                "{}\t{}\t{}\t{}",
                j, sim.switch_strength[j], sim.switch_time[j], sim.baseline[j]
            )
            .into_boxed_str(),
        );
    }
    write_lines(&lines, &genes_file)?;

    info!(
        "wrote {}, {}, {}",
        expression_file, pseudotime_file, genes_file
    );
    info!("Done");
    Ok(())
}
