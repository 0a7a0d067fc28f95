//! Reference harness: runs the built-in linkage scenarios through the clear
//! evaluator and the secure path, and compares every decision.
//!
//! Exit code 0 means every secure result matched the 32-bit clear result and
//! all three clear instantiations agreed; anything else is non-zero.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser};
use tracing_subscriber::filter::LevelFilter;

use sealink::clear::{self, ScoreUnit};
use sealink::{
    Bitmask, BooleanSharing, ClientInput, Comparator, EngineConfig, FieldDescriptor, LinkConfig,
    LinkConfigBuilder, LinkageEngine, Record, Role, ServerInput, INT_DIV_CIRCUIT_FILE,
};

#[derive(Debug, Parser)]
#[command(
    name = "link-harness",
    about = "Secure record linkage reference harness"
)]
struct Args {
    /// Run as the database-holding server. Default is client.
    #[arg(short = 'S', long)]
    server: bool,

    /// Peer host for a single-sided client run.
    #[arg(short = 'R', long)]
    remote_host: Option<String>,

    /// Boolean sharing to use. 0: GMW, 1: YAO.
    #[arg(short = 's', long, default_value_t = 1)]
    sharing: u8,

    /// Replicate each scenario's database to this many rows.
    #[arg(short = 'n', long, default_value_t = 1)]
    dbsize: u32,

    /// Evaluate both parties' inputs in one process over the loopback
    /// backend. Implied unless --server or --local-only is given.
    #[arg(short = 'r', long)]
    run_both: bool,

    /// Only run the clear evaluations; never construct the engine.
    #[arg(short = 'L', long)]
    local_only: bool,

    /// Run match counting instead of linkage.
    #[arg(short = 'm', long)]
    match_count: bool,

    /// Increase verbosity. May be given multiple times for
    /// info/debug/trace; default level is warning.
    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,
}

struct Scenario {
    name: &'static str,
    cfg: LinkConfig,
    client: ClientInput,
    server: ServerInput,
}

fn bitmask(bytes: &[u8]) -> Option<Bitmask> {
    Some(Bitmask::new(bytes.to_vec()))
}

fn record(entries: &[(&str, Option<Bitmask>)]) -> Record {
    entries
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

fn database(columns: &[(&str, Vec<Option<Bitmask>>)]) -> BTreeMap<String, Vec<Option<Bitmask>>> {
    columns
        .iter()
        .map(|(name, column)| (name.to_string(), column.clone()))
        .collect()
}

/// Replicates every column to at least `dbsize` rows by repeating the last
/// row; the winner stays at the original index because earlier rows win
/// ties.
fn replicate(server: &mut ServerInput, dbsize: u32) {
    if server.nvals >= dbsize {
        return;
    }
    for column in server.database.values_mut() {
        let last = column.last().cloned().expect("scenario column non-empty");
        column.resize(dbsize as usize, last);
    }
    server.nvals = dbsize;
}

fn scenarios(dbsize: u32) -> Vec<Scenario> {
    let mut list = Vec::new();

    // Single equality field, identical on both sides.
    {
        let cfg = LinkConfigBuilder::new()
            .field(FieldDescriptor::new("int_1", 1.0, Comparator::Equality, 32))
            .thresholds(0.9, 0.7)
            .build()
            .expect("valid scenario config");
        let payload = [0xde, 0xad, 0xbe, 0xef];
        let client = ClientInput::new(record(&[("int_1", bitmask(&payload))]), dbsize.max(1));
        let mut server = ServerInput::new(database(&[("int_1", vec![bitmask(&payload)])]))
            .expect("uniform columns");
        replicate(&mut server, dbsize);
        list.push(Scenario {
            name: "equality-identical",
            cfg,
            client,
            server,
        });
    }

    // Single set-similarity field in the tentative band: one unshared bit on
    // each side gives 2*5/(6+6) ~ 0.833.
    {
        let cfg = LinkConfigBuilder::new()
            .field(FieldDescriptor::new(
                "bm_1",
                2.0,
                Comparator::SetSimilarity,
                8,
            ))
            .thresholds(0.9, 0.7)
            .build()
            .expect("valid scenario config");
        let client = ClientInput::new(record(&[("bm_1", bitmask(&[0b0111_0111]))]), dbsize.max(1));
        let mut server = ServerInput::new(database(&[("bm_1", vec![bitmask(&[0b1011_0111])])]))
            .expect("uniform columns");
        replicate(&mut server, dbsize);
        list.push(Scenario {
            name: "set-similarity-tentative",
            cfg,
            client,
            server,
        });
    }

    // Exchange group where the swapped assignment scores higher.
    {
        let cfg = LinkConfigBuilder::new()
            .field(FieldDescriptor::new(
                "bm_1",
                2.0,
                Comparator::SetSimilarity,
                8,
            ))
            .field(FieldDescriptor::new(
                "bm_2",
                2.0,
                Comparator::SetSimilarity,
                8,
            ))
            .exchange_group(["bm_1", "bm_2"])
            .thresholds(0.9, 0.7)
            .build()
            .expect("valid scenario config");
        let client = ClientInput::new(
            record(&[("bm_1", bitmask(&[0x33])), ("bm_2", bitmask(&[0x43]))]),
            dbsize.max(1),
        );
        let mut server = ServerInput::new(database(&[
            ("bm_1", vec![bitmask(&[0x44])]),
            ("bm_2", vec![bitmask(&[0x35])]),
        ]))
        .expect("uniform columns");
        replicate(&mut server, dbsize);
        list.push(Scenario {
            name: "exchange-group-swap",
            cfg,
            client,
            server,
        });
    }

    // Missing field on one side; the second row wins on the surviving field.
    {
        let cfg = LinkConfigBuilder::new()
            .field(FieldDescriptor::new(
                "bm_1",
                2.0,
                Comparator::SetSimilarity,
                8,
            ))
            .field(FieldDescriptor::new(
                "bm_2",
                4.0,
                Comparator::SetSimilarity,
                8,
            ))
            .thresholds(0.9, 0.7)
            .build()
            .expect("valid scenario config");
        let client = ClientInput::new(
            record(&[("bm_1", None), ("bm_2", bitmask(&[0x44]))]),
            2.max(dbsize),
        );
        let mut server = ServerInput::new(database(&[
            ("bm_1", vec![None, bitmask(&[0x31])]),
            ("bm_2", vec![bitmask(&[0x43]), bitmask(&[0x44])]),
        ]))
        .expect("uniform columns");
        replicate(&mut server, dbsize);
        list.push(Scenario {
            name: "missing-field",
            cfg,
            client,
            server,
        });
    }

    list
}

fn install_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();
}

/// The loopback backend only probes the sub-circuit file for existence, so
/// the harness can bootstrap its own data directory.
fn ensure_circuit_data(dir: &PathBuf) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    let file = dir.join(INT_DIV_CIRCUIT_FILE);
    if !file.is_file() {
        fs::write(&file, b"int-div 16 16 -> 16\n")?;
    }
    Ok(())
}

fn engine_config(args: &Args) -> EngineConfig {
    EngineConfig {
        role: if args.server {
            Role::Server
        } else {
            Role::Client
        },
        boolean_sharing: if args.sharing == 0 {
            BooleanSharing::Gmw
        } else {
            BooleanSharing::Yao
        },
        peer_host: args
            .remote_host
            .clone()
            .unwrap_or_else(|| "127.0.0.1".to_string()),
        peer_port: 5676,
        worker_threads: 1,
        circuit_data_dir: PathBuf::from("data/circ"),
        reveal_score: true,
    }
}

fn decision_marker(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "MISMATCH"
    }
}

fn run_linkage_scenario(scenario: &Scenario, args: &Args) -> bool {
    let clear_32 = clear::evaluate::<u32>(&scenario.cfg, &scenario.client, &scenario.server);
    let clear_64 = clear::evaluate::<u64>(&scenario.cfg, &scenario.client, &scenario.server);
    let clear_f = clear::evaluate::<f64>(&scenario.cfg, &scenario.client, &scenario.server);
    let (clear_32, clear_64, clear_f) = match (clear_32, clear_64, clear_f) {
        (Ok(a), Ok(b), Ok(c)) => (a, b, c),
        (a, b, c) => {
            eprintln!(
                "{}: clear evaluation failed: {:?} {:?} {:?}",
                scenario.name,
                a.err(),
                b.err(),
                c.err()
            );
            return false;
        }
    };

    let mut all_good = decisions_agree(scenario.name, &clear_32, &clear_64, &clear_f);

    println!(
        "{}: clear[{}] index={} match={} tentative={} score={}/{}",
        scenario.name,
        u32::NAME,
        clear_32.index,
        clear_32.is_match,
        clear_32.is_tentative_match,
        clear_32.numerator,
        clear_32.denominator,
    );

    if args.local_only {
        return all_good;
    }

    let engine_cfg = engine_config(args);
    let mut engine = match LinkageEngine::new(engine_cfg, &scenario.cfg) {
        Ok(engine) => engine,
        Err(error) => {
            eprintln!("{}: engine construction failed: {error}", scenario.name);
            return false;
        }
    };

    let secure = engine
        .build_circuit(scenario.server.nvals)
        .and_then(|()| engine.run_setup())
        .and_then(|()| run_secure(&mut engine, scenario, args));
    let secure = match secure {
        Ok(result) => result,
        Err(error) => {
            eprintln!("{}: secure run failed: {error}", scenario.name);
            return false;
        }
    };

    let agree = secure.index == clear_32.index
        && secure.is_match == clear_32.is_match
        && secure.is_tentative_match == clear_32.is_tentative_match
        && secure.score.map_or(true, |score| {
            score.numerator == clear_32.numerator as u64
                && score.denominator == clear_32.denominator as u64
        });
    all_good &= agree;
    println!(
        "{}: secure index={} match={} tentative={} .. {}",
        scenario.name,
        secure.index,
        secure.is_match,
        secure.is_tentative_match,
        decision_marker(agree),
    );
    all_good
}

/// Picks the execution path: explicit `--run-both` wins; `--server` or an
/// explicit `--remote-host` select a single-sided run; otherwise both sides
/// run in one process, because the loopback backend has no network
/// transport.
fn run_secure(
    engine: &mut LinkageEngine<'_>,
    scenario: &Scenario,
    args: &Args,
) -> Result<sealink::LinkageResult, sealink::LinkError> {
    if args.run_both {
        engine.run_as_both(&scenario.client, &scenario.server)
    } else if args.server {
        engine.run_as_server(&scenario.server)
    } else if args.remote_host.is_some() {
        engine.run_as_client(&scenario.client)
    } else {
        engine.run_as_both(&scenario.client, &scenario.server)
    }
}

fn decisions_agree(
    name: &str,
    a: &clear::ClearResult<u32>,
    b: &clear::ClearResult<u64>,
    c: &clear::ClearResult<f64>,
) -> bool {
    let decisions = [
        (a.index, a.is_match, a.is_tentative_match),
        (b.index, b.is_match, b.is_tentative_match),
        (c.index, c.is_match, c.is_tentative_match),
    ];
    let agree = decisions.iter().all(|d| *d == decisions[0]);
    if !agree {
        eprintln!("{name}: clear instantiations disagree: {decisions:?}");
    }
    agree
}

fn run_count_scenario(scenario: &Scenario, args: &Args) -> bool {
    let counts_32 = clear::evaluate_counts::<u32>(&scenario.cfg, &scenario.client, &scenario.server);
    let counts_64 = clear::evaluate_counts::<u64>(&scenario.cfg, &scenario.client, &scenario.server);
    let counts_f = clear::evaluate_counts::<f64>(&scenario.cfg, &scenario.client, &scenario.server);
    let (counts_32, counts_64, counts_f) = match (counts_32, counts_64, counts_f) {
        (Ok(a), Ok(b), Ok(c)) => (a, b, c),
        (a, b, c) => {
            eprintln!(
                "{}: clear counting failed: {:?} {:?} {:?}",
                scenario.name,
                a.err(),
                b.err(),
                c.err()
            );
            return false;
        }
    };

    let mut all_good = counts_32 == counts_64 && counts_64 == counts_f;
    if !all_good {
        eprintln!(
            "{}: clear count instantiations disagree: {counts_32:?} {counts_64:?} {counts_f:?}",
            scenario.name
        );
    }
    println!(
        "{}: clear counts matches={} tentative={}",
        scenario.name, counts_32.matches, counts_32.tentative_matches
    );

    if args.local_only {
        return all_good;
    }

    let engine_cfg = engine_config(args);
    let mut engine = match LinkageEngine::new(engine_cfg, &scenario.cfg) {
        Ok(engine) => engine,
        Err(error) => {
            eprintln!("{}: engine construction failed: {error}", scenario.name);
            return false;
        }
    };
    let secure = engine
        .build_count_circuit(scenario.server.nvals)
        .and_then(|()| engine.run_setup())
        .and_then(|()| {
            if args.run_both {
                engine.count_as_both(&scenario.client, &scenario.server)
            } else if args.server {
                engine.count_as_server(&scenario.server)
            } else if args.remote_host.is_some() {
                engine.count_as_client(&scenario.client)
            } else {
                engine.count_as_both(&scenario.client, &scenario.server)
            }
        });
    let secure = match secure {
        Ok(result) => result,
        Err(error) => {
            eprintln!("{}: secure count failed: {error}", scenario.name);
            return false;
        }
    };

    let agree =
        secure.matches == counts_32.matches && secure.tentative_matches == counts_32.tentative_matches;
    all_good &= agree;
    println!(
        "{}: secure counts matches={} tentative={} .. {}",
        scenario.name,
        secure.matches,
        secure.tentative_matches,
        decision_marker(agree),
    );
    all_good
}

fn main() -> ExitCode {
    let args = Args::parse();
    install_logging(args.verbose);

    if !args.local_only {
        if let Err(error) = ensure_circuit_data(&PathBuf::from("data/circ")) {
            eprintln!("failed to prepare circuit data directory: {error}");
            return ExitCode::FAILURE;
        }
    }

    let mut all_good = true;
    for scenario in scenarios(args.dbsize) {
        let good = if args.match_count {
            run_count_scenario(&scenario, &args)
        } else {
            run_linkage_scenario(&scenario, &args)
        };
        all_good &= good;
    }

    if all_good {
        println!("all scenarios agree");
        ExitCode::SUCCESS
    } else {
        eprintln!("scenario mismatches occurred");
        ExitCode::FAILURE
    }
}
