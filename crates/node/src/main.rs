use pchaind_log as logging;

macro_rules! log_at {
    ($level:expr, $($arg:tt)*) => {{
        if crate::logging::enabled($level) {
            crate::logging::log($level, module_path!(), file!(), line!(), format_args!($($arg)*));
        }
    }};
}

macro_rules! log_error {
    ($($arg:tt)*) => {{
        log_at!(crate::logging::Level::Error, $($arg)*);
    }};
}

macro_rules! log_info {
    ($($arg:tt)*) => {{
        log_at!(crate::logging::Level::Info, $($arg)*);
    }};
}

pub mod memwatch;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use pchaind_chainstate::census::{census_with_options, CensusOptions, NODE_DUMP_FILE_NAME};
use pchaind_chainstate::genesis::{setup_genesis, GenesisSpec};
use pchaind_chainstate::index::ChainIndex;
use pchaind_chainstate::preimages::{export_preimages, import_preimages};
use pchaind_chainstate::segments::{export_segments, import_segments, parse_export_range};
use pchaind_primitives::encoding::decode;
use pchaind_primitives::{bytes_to_hex, hash256_from_hex, AccountRecord, Block};
use pchaind_storage::fjall::FjallStore;
use pchaind_storage::memory::MemoryStore;
use pchaind_storage::{KeyValueStore, STAT_GENERAL, STAT_IO};
use pchaind_trie::{NodeIterator, WalkedNode};

use memwatch::MemoryWatcher;

#[global_allocator]
static GLOBAL_ALLOCATOR: memwatch::CountingAllocator = memwatch::CountingAllocator;

const DEFAULT_DATA_DIR: &str = "pchaind-data";
/// Full and light chain databases, both initialized by `init`.
const DATABASE_NAMES: [&str; 2] = ["chaindata", "lightchaindata"];
const CHAIN_DATABASE: &str = DATABASE_NAMES[0];
const MEM_SAMPLE_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    Memory,
    Fjall,
}

#[derive(Clone, Debug)]
pub struct CliOptions {
    pub data_dir: PathBuf,
    pub backend: Backend,
    pub no_compaction: bool,
    pub dedup: bool,
    pub log_level: logging::Level,
    pub log_format: logging::Format,
    pub log_timestamps: bool,
}

impl Default for CliOptions {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            backend: Backend::Fjall,
            no_compaction: false,
            dedup: false,
            log_level: logging::Level::Info,
            log_format: logging::Format::Text,
            log_timestamps: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CliAction {
    Init { genesis_path: PathBuf },
    Import { files: Vec<PathBuf> },
    Export { file: PathBuf, range: Option<(String, String)> },
    ImportPreimages { file: PathBuf },
    ExportPreimages { file: PathBuf },
    CountState { height: String },
    Dump { blocks: Vec<String> },
    Help,
}

pub fn parse_args() -> Result<(CliOptions, CliAction), String> {
    parse_args_from(std::env::args().skip(1))
}

pub fn parse_args_from<I>(raw_args: I) -> Result<(CliOptions, CliAction), String>
where
    I: IntoIterator<Item = String>,
{
    let mut options = CliOptions::default();
    let mut command: Option<String> = None;
    let mut positional: Vec<String> = Vec::new();

    let mut args = raw_args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--datadir" => {
                let value = args.next().ok_or("--datadir requires a path")?;
                options.data_dir = PathBuf::from(value);
            }
            "--backend" => {
                let value = args.next().ok_or("--backend requires memory or fjall")?;
                options.backend = match value.as_str() {
                    "memory" => Backend::Memory,
                    "fjall" => Backend::Fjall,
                    other => return Err(format!("unknown backend {other:?}")),
                };
            }
            "--no-compaction" => options.no_compaction = true,
            "--dedup" => options.dedup = true,
            "--log-level" => {
                let value = args.next().ok_or("--log-level requires a value")?;
                options.log_level = logging::Level::parse(&value)
                    .ok_or_else(|| format!("unknown log level {value:?}"))?;
            }
            "--log-format" => {
                let value = args.next().ok_or("--log-format requires a value")?;
                options.log_format = logging::Format::parse(&value)
                    .ok_or_else(|| format!("unknown log format {value:?}"))?;
            }
            "--no-log-timestamps" => options.log_timestamps = false,
            "--help" | "-h" | "help" => return Ok((options, CliAction::Help)),
            other if other.starts_with("--") => {
                return Err(format!("unknown flag {other:?}"));
            }
            _ if command.is_none() => command = Some(arg),
            _ => positional.push(arg),
        }
    }

    let Some(command) = command else {
        return Ok((options, CliAction::Help));
    };

    let action = match command.as_str() {
        "init" => match positional.as_slice() {
            [path] => CliAction::Init {
                genesis_path: PathBuf::from(path),
            },
            _ => return Err("init expects exactly one argument: <genesis.json>".to_string()),
        },
        "import" => {
            if positional.is_empty() {
                return Err("import expects one or more segment files".to_string());
            }
            CliAction::Import {
                files: positional.iter().map(PathBuf::from).collect(),
            }
        }
        "export" => match positional.as_slice() {
            [file] => CliAction::Export {
                file: PathBuf::from(file),
                range: None,
            },
            [file, first, last] => CliAction::Export {
                file: PathBuf::from(file),
                range: Some((first.clone(), last.clone())),
            },
            _ => {
                return Err(
                    "export expects <file> or <file> <first> <last>".to_string()
                )
            }
        },
        "import-preimages" => match positional.as_slice() {
            [file] => CliAction::ImportPreimages {
                file: PathBuf::from(file),
            },
            _ => return Err("import-preimages expects exactly one file".to_string()),
        },
        "export-preimages" => match positional.as_slice() {
            [file] => CliAction::ExportPreimages {
                file: PathBuf::from(file),
            },
            _ => return Err("export-preimages expects exactly one file".to_string()),
        },
        "count-state" => match positional.as_slice() {
            [height] => CliAction::CountState {
                height: height.clone(),
            },
            _ => return Err("count-state expects exactly one block height".to_string()),
        },
        "dump" => {
            if positional.is_empty() {
                return Err("dump expects one or more block numbers or hashes".to_string());
            }
            CliAction::Dump { blocks: positional }
        }
        other => return Err(format!("unknown command {other:?}")),
    };
    Ok((options, action))
}

pub fn run_entry() -> Result<(), String> {
    let (options, action) = parse_args()?;
    logging::init(logging::LogConfig {
        level: options.log_level,
        format: options.log_format,
        timestamps: options.log_timestamps,
    });

    match options.backend {
        Backend::Memory => run_action::<MemoryStore>(&options, action),
        Backend::Fjall => run_action::<FjallStore>(&options, action),
    }
}

/// A backend the CLI can open per named database directory.
pub trait StoreBackend: KeyValueStore + Sized + 'static {
    fn open_at(dir: &Path) -> Result<Self, String>;
}

impl StoreBackend for MemoryStore {
    fn open_at(_dir: &Path) -> Result<Self, String> {
        Ok(MemoryStore::new())
    }
}

impl StoreBackend for FjallStore {
    fn open_at(dir: &Path) -> Result<Self, String> {
        FjallStore::open(dir).map_err(|err| format!("failed to open database: {err}"))
    }
}

fn open_index<S: StoreBackend>(
    options: &CliOptions,
    name: &str,
) -> Result<ChainIndex<S>, String> {
    let store = S::open_at(&options.data_dir.join(name))?;
    Ok(ChainIndex::new(Arc::new(store)))
}

fn run_action<S: StoreBackend>(options: &CliOptions, action: CliAction) -> Result<(), String> {
    match action {
        CliAction::Init { genesis_path } => run_init::<S>(options, &genesis_path),
        CliAction::Import { files } => run_import::<S>(options, &files),
        CliAction::Export { file, range } => run_export::<S>(options, &file, range.as_ref()),
        CliAction::ImportPreimages { file } => run_import_preimages::<S>(options, &file),
        CliAction::ExportPreimages { file } => run_export_preimages::<S>(options, &file),
        CliAction::CountState { height } => run_count_state::<S>(options, &height),
        CliAction::Dump { blocks } => run_dump::<S>(options, &blocks),
        CliAction::Help => {
            print_usage();
            Ok(())
        }
    }
}

/// Decode the genesis spec once, then initialize every named database.
/// Any failure is fatal before the next database is touched.
fn run_init<S: StoreBackend>(options: &CliOptions, genesis_path: &Path) -> Result<(), String> {
    let file = File::open(genesis_path)
        .map_err(|err| format!("failed to read genesis file: {err}"))?;
    let spec = GenesisSpec::from_json(file).map_err(|err| err.to_string())?;

    for name in DATABASE_NAMES {
        let index = open_index::<S>(options, name)?;
        let hash = setup_genesis(&index, &spec)
            .map_err(|err| format!("failed to write genesis block: {err}"))?;
        log_info!(
            "successfully wrote genesis state database={name} hash={}",
            bytes_to_hex(&hash)
        );
    }
    Ok(())
}

fn run_import<S: StoreBackend>(options: &CliOptions, files: &[PathBuf]) -> Result<(), String> {
    let index = open_index::<S>(options, CHAIN_DATABASE)?;
    let store = Arc::clone(index.store());

    let watcher = MemoryWatcher::spawn(MEM_SAMPLE_INTERVAL);
    let start = Instant::now();
    let result = import_segments(&index, files);
    let elapsed = start.elapsed();
    let peaks = watcher.stop();

    let failed = match result {
        Ok(summary) => {
            println!(
                "Import done in {elapsed:?}. {} blocks from {} file(s), {} file(s) failed.\n",
                summary.blocks_imported, summary.files_ok, summary.files_failed
            );
            summary.files_failed > 0
        }
        Err(err) => {
            log_error!("import error: {err}");
            true
        }
    };

    print_store_stats(&store)?;

    println!(
        "Object memory: {:.3} MB current, {:.3} MB peak",
        mib(memwatch::allocated_bytes()),
        mib(peaks.alloc_bytes)
    );
    println!(
        "System memory: {:.3} MB current, {:.3} MB peak",
        mib(memwatch::resident_bytes()),
        mib(peaks.resident_bytes)
    );
    println!(
        "Allocations:   {:.3} million\n",
        memwatch::allocation_count() as f64 / 1_000_000.0
    );

    if !options.no_compaction {
        println!("Compacting entire database...");
        let start = Instant::now();
        store
            .compact_all()
            .map_err(|err| format!("compaction failed: {err}"))?;
        println!("Compaction done in {:?}.\n", start.elapsed());
        print_store_stats(&store)?;
    }

    if failed {
        return Err("import finished with errors".to_string());
    }
    Ok(())
}

fn run_export<S: StoreBackend>(
    options: &CliOptions,
    file: &Path,
    range: Option<&(String, String)>,
) -> Result<(), String> {
    // Bounds are validated before any database or file is opened.
    let range = match range {
        Some((first, last)) => {
            Some(parse_export_range(first, last).map_err(|err| err.to_string())?)
        }
        None => None,
    };

    let index = open_index::<S>(options, CHAIN_DATABASE)?;
    let start = Instant::now();
    let written = export_segments(&index, file, range)
        .map_err(|err| format!("export error: {err}"))?;
    println!("Export done in {:?}, {written} blocks", start.elapsed());
    Ok(())
}

fn run_import_preimages<S: StoreBackend>(
    options: &CliOptions,
    file: &Path,
) -> Result<(), String> {
    let index = open_index::<S>(options, CHAIN_DATABASE)?;
    let start = Instant::now();
    let imported = import_preimages(index.store(), file)
        .map_err(|err| format!("import error: {err}"))?;
    println!(
        "Import done in {:?}, {imported} preimages",
        start.elapsed()
    );
    Ok(())
}

fn run_export_preimages<S: StoreBackend>(
    options: &CliOptions,
    file: &Path,
) -> Result<(), String> {
    let index = open_index::<S>(options, CHAIN_DATABASE)?;
    let start = Instant::now();
    let exported = export_preimages(index.store(), file)
        .map_err(|err| format!("export error: {err}"))?;
    println!(
        "Export done in {:?}, {exported} preimages",
        start.elapsed()
    );
    Ok(())
}

/// Census a block's state forest. The node dump file is only written
/// after the whole traversal has succeeded.
fn run_count_state<S: StoreBackend>(options: &CliOptions, height: &str) -> Result<(), String> {
    let height: u64 = height
        .trim()
        .parse()
        .map_err(|_| format!("block height not an integer: {height:?}"))?;

    let index = open_index::<S>(options, CHAIN_DATABASE)?;
    let report = census_with_options(&index, height, CensusOptions {
        dedup: options.dedup,
    })
    .map_err(|err| err.to_string())?;

    let file = File::create(NODE_DUMP_FILE_NAME)
        .map_err(|err| format!("failed to create {NODE_DUMP_FILE_NAME}: {err}"))?;
    let mut writer = BufWriter::new(file);
    report
        .accumulator
        .write_node_dump(&mut writer)
        .and_then(|()| writer.flush())
        .map_err(|err| format!("failed to write {NODE_DUMP_FILE_NAME}: {err}"))?;

    println!(
        "Block {}, block size {}, state node {}, state size {}",
        report.height,
        report.block_size,
        report.accumulator.total_nodes,
        report.accumulator.total_bytes
    );
    Ok(())
}

fn run_dump<S: StoreBackend>(options: &CliOptions, blocks: &[String]) -> Result<(), String> {
    let index = open_index::<S>(options, CHAIN_DATABASE)?;
    for arg in blocks {
        let block = lookup_block(&index, arg)?;
        let Some(block) = block else {
            println!("{{}}");
            return Err("block not found".to_string());
        };
        let doc = dump_state(index.store(), &block).map_err(|err| err.to_string())?;
        println!("{doc}");
    }
    Ok(())
}

fn lookup_block<S: KeyValueStore>(
    index: &ChainIndex<S>,
    arg: &str,
) -> Result<Option<Block>, String> {
    // Numbers are heights; anything else must be a block hash.
    if let Ok(height) = arg.trim().parse::<u64>() {
        return index.block_by_height(height).map_err(|err| err.to_string());
    }
    let hash = hash256_from_hex(arg).map_err(|err| format!("bad block hash {arg:?}: {err}"))?;
    index.block_by_hash(&hash).map_err(|err| err.to_string())
}

fn dump_state<S: KeyValueStore>(store: &S, block: &Block) -> Result<String, String> {
    let mut accounts = serde_json::Map::new();
    for item in NodeIterator::new(store, block.header.state_root) {
        let node = item.map_err(|err| err.to_string())?;
        let WalkedNode::Leaf { key, value, .. } = node else {
            continue;
        };
        if key.len() != 20 {
            continue;
        }
        let account = decode::<AccountRecord>(&value)
            .map_err(|err| format!("account record undecodable: {err}"))?;
        accounts.insert(
            bytes_to_hex(&key),
            serde_json::json!({
                "balance": account.balance.to_string(),
                "nonce": account.nonce,
                "storage_root": bytes_to_hex(&account.storage_root),
                "tx1_root": bytes_to_hex(&account.tx1_root),
                "tx3_root": bytes_to_hex(&account.tx3_root),
                "proxied_root": bytes_to_hex(&account.proxied_root),
                "reward_root": bytes_to_hex(&account.reward_root),
            }),
        );
    }
    let doc = serde_json::json!({
        "root": bytes_to_hex(&block.header.state_root),
        "height": block.header.height,
        "accounts": accounts,
    });
    serde_json::to_string_pretty(&doc).map_err(|err| err.to_string())
}

fn print_store_stats(store: &impl KeyValueStore) -> Result<(), String> {
    let stats = store
        .stat(STAT_GENERAL)
        .map_err(|err| format!("failed to read database stats: {err}"))?;
    println!("{stats}");
    let iostats = store
        .stat(STAT_IO)
        .map_err(|err| format!("failed to read database iostats: {err}"))?;
    println!("{iostats}\n");
    Ok(())
}

fn mib(bytes: u64) -> f64 {
    bytes as f64 / 1024.0 / 1024.0
}

fn print_usage() {
    println!(
        "usage: pchaind [flags] <command> [args]

commands:
  init <genesis.json>              bootstrap the chain databases from a genesis spec
  import <file>...                 import chain segment files
  export <file> [<first> <last>]   export the chain, optionally a height range
  import-preimages <file>          import a preimage stream
  export-preimages <file>          export the preimage database
  count-state <height>             census a block's state trie forest
  dump <height|hash>...            dump account records at a block

flags:
  --datadir <path>      data directory (default {DEFAULT_DATA_DIR})
  --backend <name>      memory | fjall (default fjall)
  --no-compaction       skip the post-import compaction pass
  --dedup               census: count each distinct node once globally
  --log-level <level>   error | warn | info | debug | trace
  --log-format <fmt>    text | json
  --no-log-timestamps   omit timestamps from text logs"
    );
}

pub use memwatch::{allocated_bytes, allocation_count, resident_bytes};

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<(CliOptions, CliAction), String> {
        parse_args_from(args.iter().map(|arg| arg.to_string()))
    }

    #[test]
    fn parses_commands_and_flags() {
        let (options, action) =
            parse(&["--backend", "memory", "import", "a.seg", "b.seg"]).expect("parse");
        assert_eq!(options.backend, Backend::Memory);
        assert_eq!(
            action,
            CliAction::Import {
                files: vec![PathBuf::from("a.seg"), PathBuf::from("b.seg")],
            }
        );

        let (options, action) =
            parse(&["export", "chain.seg", "10", "20", "--datadir", "/tmp/x"]).expect("parse");
        assert_eq!(options.data_dir, PathBuf::from("/tmp/x"));
        assert_eq!(
            action,
            CliAction::Export {
                file: PathBuf::from("chain.seg"),
                range: Some(("10".to_string(), "20".to_string())),
            }
        );
    }

    #[test]
    fn count_state_keeps_raw_height() {
        let (_, action) = parse(&["count-state", "-1"]).expect("parse");
        assert_eq!(
            action,
            CliAction::CountState {
                height: "-1".to_string()
            }
        );
    }

    #[test]
    fn rejects_malformed_invocations() {
        assert!(parse(&["init"]).is_err());
        assert!(parse(&["export", "f", "10"]).is_err());
        assert!(parse(&["--backend", "sqlite", "import", "x"]).is_err());
        assert!(parse(&["--frobnicate"]).is_err());
        assert!(parse(&["conjure"]).is_err());
    }

    #[test]
    fn no_arguments_is_help() {
        let (_, action) = parse(&[]).expect("parse");
        assert_eq!(action, CliAction::Help);
    }
}
