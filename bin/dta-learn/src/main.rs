//! Learns a deterministic timed automaton from a one-clock target given in
//! the OTA JSON format, printing the learned automaton as DOT together with
//! query statistics.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::info;

use timed_automata::parse_ota_file;
use timed_learning::{
    AutomatonSul, ComplementEquivalenceOracle, EquivalenceOracle, EquivalenceOracleChain,
    Learner, MemoEquivalenceOracle, RandomTestEquivalenceOracle, SymbolicMembershipOracle,
};

#[derive(Parser)]
#[command(about = "Active learning of deterministic timed automata")]
struct Args {
    /// The target automaton in the OTA JSON format
    target: PathBuf,

    /// Number of random test words tried before the zone-based oracle
    #[arg(long, default_value_t = 0)]
    random_tests: usize,

    /// Maximum number of events per random test word
    #[arg(long, default_value_t = 5)]
    random_length: usize,

    /// Maximum delay per step of a random test word
    #[arg(long, default_value_t = 10.0)]
    random_duration: f64,

    /// Seed of the random tester
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    let (target, alphabet) = match parse_ota_file(&args.target) {
        Ok(parsed) => parsed,
        Err(error) => {
            eprintln!("failed to parse {}: {error}", args.target.display());
            return ExitCode::FAILURE;
        }
    };
    if !target.deterministic() {
        eprintln!("the target automaton is not deterministic");
        return ExitCode::FAILURE;
    }
    info!("learning a target with {} locations", target.state_size());

    let membership =
        SymbolicMembershipOracle::new(Box::new(AutomatonSul::new(target.clone())));
    let mut chain = EquivalenceOracleChain::new();
    if args.random_tests > 0 {
        chain.push(Box::new(RandomTestEquivalenceOracle::new(
            alphabet.clone(),
            target.clone(),
            args.random_tests,
            args.random_length,
            args.random_duration,
            args.seed,
        )));
    }
    chain.push(Box::new(ComplementEquivalenceOracle::new(
        target.clone(),
        alphabet.clone(),
    )));
    let eq_oracle = MemoEquivalenceOracle::new(Box::new(chain), target);

    let mut learner = Learner::new(alphabet, membership, Box::new(eq_oracle));
    match learner.run() {
        Ok(hypothesis) => {
            println!("{hypothesis}");
            eprint!("{}", learner.statistics());
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("learning failed: {error}");
            ExitCode::FAILURE
        }
    }
}
