//! `ext3recover` — a forensic recovery tool for classic (non-extent) ext3 images.
//!
//! Reads a raw block device or disk image, walks the live directory tree for deleted
//! regular-file entries, and cross-references the journal to reconstitute their prior
//! contents.

use recovery_core::geometry::Inode;
use recovery_core::journal::JournalRecord;
use recovery_core::recovery::RecoveryOutcome;
use recovery_core::Engine;
use std::env::{self, ArgsOs};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::process::exit;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Prints `"<bin>: error: <msg>"` to stderr and exits with status 1, matching this
/// tree's existing `utils::error` convention.
fn error(bin: &str, msg: impl fmt::Display) -> ! {
    eprintln!("{bin}: error: {msg}");
    exit(1);
}

/// Parsed command-line invocation.
struct Args {
    help: bool,
    verbose: bool,
    device_path: Option<PathBuf>,
    command: Command,
}

enum Command {
    /// No sub-command: run full recovery.
    Recover,
    /// `j` — print journal records.
    Journal,
    /// `i <inode_num>` — print one inode.
    Inode(u32),
    /// `fs` — print super-block and descriptor table.
    FsInfo,
    /// `jb <index>` — print a raw journal block.
    JournalBlock(u64),
    /// `ji <inode_num> <journal_position>` — print an inode reconstructed from a
    /// journal page.
    JournalInode(u32, u64),
}

fn parse_args(mut args: ArgsOs) -> Args {
    args.next(); // skip argv[0]

    let mut help = false;
    let mut verbose = false;
    let mut device_path = None;
    let mut rest = Vec::new();

    for arg in args {
        match arg.to_str() {
            Some("-h" | "--help") => help = true,
            Some("-v" | "--verbose") => verbose = true,
            _ if device_path.is_none() => device_path = Some(PathBuf::from(arg)),
            _ => rest.push(arg.to_string_lossy().into_owned()),
        }
    }

    let command = match rest.first().map(String::as_str) {
        None => Command::Recover,
        Some("j") => Command::Journal,
        Some("fs") => Command::FsInfo,
        Some("i") => {
            let n = rest
                .get(1)
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(|| error("ext3recover", "`i` requires an inode number"));
            Command::Inode(n)
        }
        Some("jb") => {
            let idx = rest
                .get(1)
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(|| error("ext3recover", "`jb` requires a journal block index"));
            Command::JournalBlock(idx)
        }
        Some("ji") => {
            let inode_num = rest
                .get(1)
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(|| error("ext3recover", "`ji` requires an inode number"));
            let position = rest
                .get(2)
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(|| error("ext3recover", "`ji` requires a journal position"));
            Command::JournalInode(inode_num, position)
        }
        Some(other) => error("ext3recover", format_args!("unknown sub-command `{other}`")),
    };

    Args {
        help,
        verbose,
        device_path,
        command,
    }
}

const USAGE: &str = "\
Usage: ext3recover <device> [j | i <inode> | fs | jb <index> | ji <inode> <position>]
       ext3recover -h | --help

With no sub-command, recovers deleted files into the current directory.
  j                      print journal records
  i <inode>              print one inode
  fs                     print super-block and descriptor table
  jb <index>             print raw bytes of a journal block
  ji <inode> <position>  print the inode reconstructed from a journal page

  -v, --verbose          print internal errors before falling back to summaries
  -h, --help             print this message";

fn main() {
    let args = parse_args(env::args_os());

    if args.help {
        println!("{USAGE}");
        return;
    }

    let device_path = args
        .device_path
        .unwrap_or_else(|| error("ext3recover", "specify path to a device or disk image"));

    let mut engine = Engine::open(&device_path).unwrap_or_else(|e| {
        if args.verbose {
            eprintln!("ext3recover: {e}");
        }
        error("ext3recover", "Storage is not ext3 or is damaged")
    });

    match args.command {
        Command::Recover => run_recovery(&mut engine, args.verbose),
        Command::Journal => print_journal(&mut engine, args.verbose),
        Command::Inode(n) => print_inode(&mut engine, n),
        Command::FsInfo => print_fs_info(&engine),
        Command::JournalBlock(idx) => print_journal_block(&mut engine, idx),
        Command::JournalInode(inode_num, position) => {
            print_journal_inode(&mut engine, inode_num, position)
        }
    }
}

fn run_recovery(engine: &mut Engine, verbose: bool) {
    let results = engine.recover_all().unwrap_or_else(|e| {
        if verbose {
            eprintln!("ext3recover: {e}");
        }
        error("ext3recover", "recovery aborted")
    });

    if results.is_empty() {
        println!("no deleted files found");
        return;
    }

    for (i, (entry, outcome)) in results.iter().enumerate() {
        let ordinal = i + 1;
        match outcome {
            RecoveryOutcome::Recovered(bytes) => {
                let out_name = format!("{ordinal}_{}", entry.name);
                match fs::write(&out_name, bytes) {
                    Ok(()) => {
                        println!("recovered {} -> {out_name} ({} bytes)", entry.name, bytes.len())
                    }
                    Err(e) => eprintln!("ext3recover: failed to write {out_name}: {e}"),
                }
            }
            RecoveryOutcome::NotRecoverable {
                live_inode,
                journal_error,
            } => {
                let out_name = format!("NOT RESTORED {}.txt", entry.name);
                let dump = format_inode(entry.inode, live_inode);
                match fs::write(&out_name, dump) {
                    Ok(()) => match journal_error {
                        Some(e) => println!(
                            "journal damaged, could not search for {}: {e} (see {out_name})",
                            entry.name
                        ),
                        None => println!("not recoverable: {} (see {out_name})", entry.name),
                    },
                    Err(e) => eprintln!("ext3recover: failed to write {out_name}: {e}"),
                }
            }
        }
    }
}

fn print_journal(engine: &mut Engine, verbose: bool) {
    let (records, err) = engine.scan_journal();
    for (position, record) in &records {
        match record {
            JournalRecord::Descriptor {
                shadowed_blocks,
                journal_indices,
            } => println!(
                "{position}: descriptor shadows={shadowed_blocks:?} pages={journal_indices:?}"
            ),
            JournalRecord::Commit { sequence } => println!("{position}: commit seq={sequence}"),
            JournalRecord::Superblock { sequence } => {
                println!("{position}: journal super-block seq={sequence}")
            }
            JournalRecord::Revoke { sequence } => println!("{position}: revoke seq={sequence}"),
            JournalRecord::DataPage { shadowed_block } => {
                println!("{position}: data page for block {shadowed_block}")
            }
        }
    }
    if let Some(e) = err {
        if verbose {
            eprintln!("ext3recover: journal scan stopped: {e}");
        } else {
            println!("(journal scan ended early: {e})");
        }
    }
}

fn print_inode(engine: &mut Engine, inode_num: u32) {
    let inode = engine
        .read_inode(inode_num)
        .unwrap_or_else(|e| error("ext3recover", format_args!("inode {inode_num}: {e}")));
    print!("{}", format_inode(inode_num, &inode));
}

fn print_journal_inode(engine: &mut Engine, inode_num: u32, position: u64) {
    let inode = engine
        .read_inode_from_journal(inode_num, position)
        .unwrap_or_else(|e| {
            error(
                "ext3recover",
                format_args!("inode {inode_num} at journal position {position}: {e}"),
            )
        });
    print!("{}", format_inode(inode_num, &inode));
}

fn print_journal_block(engine: &mut Engine, index: u64) {
    let buf = engine
        .read_journal_block(index)
        .unwrap_or_else(|e| error("ext3recover", format_args!("journal block {index}: {e}")));
    for (i, chunk) in buf.chunks(16).enumerate() {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
        println!("{:08x}  {}", i * 16, hex.join(" "));
    }
}

fn print_fs_info(engine: &Engine) {
    let sb = &engine.fs.superblock;
    let inode_count = sb.inode_count;
    let block_count = sb.block_count;
    let free_blocks = sb.free_blocks;
    let free_inodes = sb.free_inodes;
    let first_data_block = sb.first_data_block;
    let blocks_per_group = sb.blocks_per_group;
    let inodes_per_group = sb.inodes_per_group;
    let journal_inode = sb.journal_inode;

    println!("block size:       {}", engine.fs.block_size);
    println!("inode count:      {inode_count}");
    println!("block count:      {block_count}");
    println!("free blocks:      {free_blocks}");
    println!("free inodes:      {free_inodes}");
    println!("first data block: {first_data_block}");
    println!("blocks per group: {blocks_per_group}");
    println!("inodes per group: {inodes_per_group}");
    println!("inode size:       {}", sb.inode_size());
    println!("journal inode:    {journal_inode}");
    println!("group count:      {}", engine.fs.groups.len());
    for (i, g) in engine.fs.groups.iter().enumerate() {
        let inode_table_start = g.inode_table_start;
        let free_blocks = g.free_blocks;
        let free_inodes = g.free_inodes;
        let directory_count = g.directory_count;
        println!(
            "  group {i}: inode_table@{inode_table_start} free_blocks={free_blocks} free_inodes={free_inodes} dirs={directory_count}"
        );
    }
}

/// Renders a POSIX timestamp as a calendar date, falling back to the raw integer for
/// the handful of inode fields too far out of range to represent (commonly a zeroed or
/// garbage field on a deleted inode).
fn format_timestamp(secs: u32) -> String {
    OffsetDateTime::from_unix_timestamp(secs as i64)
        .ok()
        .and_then(|dt| dt.format(&Rfc3339).ok())
        .unwrap_or_else(|| secs.to_string())
}

fn format_inode(inode_num: u32, inode: &Inode) -> String {
    format!(
        "inode {inode_num}\n  size:   {}\n  links:  {}\n  atime:  {}\n  ctime:  {}\n  mtime:  {}\n  dtime:  {}\n  blocks: {:?}\n",
        inode.size,
        inode.links_count,
        format_timestamp(inode.atime),
        format_timestamp(inode.ctime),
        format_timestamp(inode.mtime),
        format_timestamp(inode.dtime),
        inode.blocks
    )
}
