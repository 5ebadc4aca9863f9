use bootgpt_cli::calc::{parse_u32, parse_u64, SizeArg};
use bootgpt_cli::commands::{self, AddRequest};
use bootgpt_cli::guid::{parse_guid, parse_type};
use bootgpt_cli::{logger, FileBlockDevice};
use bootgpt_core::UpdateType;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use uguid::Guid;

#[derive(Parser)]
#[command(name = "bootgpt", version, about = "GPT repair and kernel boot-priority tool", long_about = None)]
struct Cli {
    /// More log output (repeat for debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write an empty GPT, destroying the existing table
    Create(DriveArg),
    /// Add, edit or remove a partition entry
    Add(AddArgs),
    /// Print the partition table
    Show {
        /// Show only this partition
        #[arg(short = 'i', value_name = "NUM", value_parser = parse_u32)]
        number: Option<u32>,
        #[command(flatten)]
        drive: DriveArg,
    },
    /// Validate both GPT copies and rebuild a damaged one
    Repair(DriveArg),
    /// Switch the header signature to "CHROMEOS"
    Legacy {
        /// Switch back to "EFI PART"
        #[arg(short = 'e')]
        efi: bool,
        #[command(flatten)]
        drive: DriveArg,
    },
    /// Renumber kernel priorities, keeping their order
    Prioritize {
        /// Kernel to move to the highest priority
        #[arg(short = 'i', value_name = "NUM", value_parser = parse_u32)]
        number: Option<u32>,
        /// Highest priority to hand out (1-15)
        #[arg(short = 'P', value_name = "NUM", value_parser = clap::value_parser!(u8).range(1..=15))]
        max_priority: Option<u8>,
        /// Also move kernels that share the priority of -i
        #[arg(short = 'f', requires = "number")]
        friends: bool,
        #[command(flatten)]
        drive: DriveArg,
    },
    /// Print the partition with the given unique GUID
    Find {
        /// Partition unique GUID
        #[arg(short = 'u', value_name = "GUID", value_parser = parse_guid)]
        unique: Guid,
        #[command(flatten)]
        drive: DriveArg,
    },
    /// Select the next kernel to boot
    Next {
        /// Spend one try of the selected kernel
        #[arg(long = "try", conflicts_with = "bad")]
        try_kernel: bool,
        /// Mark the selected kernel bad
        #[arg(long)]
        bad: bool,
        #[command(flatten)]
        drive: DriveArg,
    },
}

#[derive(Args)]
struct DriveArg {
    #[arg(value_name = "DRIVE")]
    drive: PathBuf,
}

#[derive(Args)]
struct AddArgs {
    /// Partition number (default is the next available)
    #[arg(short = 'i', value_name = "NUM", value_parser = parse_u32)]
    number: Option<u32>,
    /// Beginning sector
    #[arg(short = 'b', value_name = "NUM", value_parser = parse_u64)]
    begin: Option<u64>,
    /// Size in sectors, or `$calc($lba_end-N)`
    #[arg(short = 's', value_name = "NUM")]
    size: Option<SizeArg>,
    /// Partition type GUID or name
    #[arg(short = 't', value_name = "GUID", value_parser = parse_type)]
    type_guid: Option<Guid>,
    /// Partition unique GUID
    #[arg(short = 'u', value_name = "GUID", value_parser = parse_guid)]
    unique: Option<Guid>,
    /// Label
    #[arg(short = 'l', value_name = "LABEL")]
    label: Option<String>,
    /// Successful flag (0|1)
    #[arg(short = 'S', value_name = "NUM", value_parser = clap::value_parser!(u8).range(0..=1))]
    successful: Option<u8>,
    /// Tries (0-15)
    #[arg(short = 'T', value_name = "NUM", value_parser = clap::value_parser!(u8).range(0..=15))]
    tries: Option<u8>,
    /// Priority (0-15)
    #[arg(short = 'P', value_name = "NUM", value_parser = clap::value_parser!(u8).range(0..=15))]
    priority: Option<u8>,
    /// Raw 64-bit attribute value
    #[arg(short = 'A', value_name = "NUM", value_parser = parse_u64)]
    raw: Option<u64>,
    #[command(flatten)]
    drive: DriveArg,
}

impl AddArgs {
    fn request(&self) -> AddRequest {
        AddRequest {
            number: self.number,
            begin: self.begin,
            size: self.size,
            type_guid: self.type_guid,
            unique_guid: self.unique,
            label: self.label.clone(),
            successful: self.successful.map(|s| s == 1),
            tries: self.tries,
            priority: self.priority,
            raw_attributes: self.raw,
        }
    }
}

fn open(path: &Path) -> anyhow::Result<FileBlockDevice> {
    FileBlockDevice::open(path).map_err(|err| anyhow::anyhow!("cannot open {}: {err}", path.display()))
}

fn run(command: Command) -> anyhow::Result<()> {
    let mut out = io::stdout().lock();
    match command {
        Command::Create(arg) => {
            commands::create(&mut open(&arg.drive)?, &mut out)?;
        }
        Command::Add(args) => {
            commands::add(&mut open(&args.drive.drive)?, &args.request(), &mut out)?;
        }
        Command::Show { number, drive } => {
            commands::show(&mut open(&drive.drive)?, number, &mut out)?;
        }
        Command::Repair(arg) => {
            commands::repair(&mut open(&arg.drive)?, &mut out)?;
        }
        Command::Legacy { efi, drive } => {
            commands::legacy(&mut open(&drive.drive)?, efi, &mut out)?;
        }
        Command::Prioritize {
            number,
            max_priority,
            friends,
            drive,
        } => {
            commands::prioritize(&mut open(&drive.drive)?, number, max_priority, friends, &mut out)?;
        }
        Command::Find { unique, drive } => {
            commands::find(&mut open(&drive.drive)?, unique, &mut out)?;
        }
        Command::Next {
            try_kernel,
            bad,
            drive,
        } => {
            let outcome = if bad {
                Some(UpdateType::Bad)
            } else if try_kernel {
                Some(UpdateType::Try)
            } else {
                None
            };
            commands::next(&mut open(&drive.drive)?, outcome, &mut out)?;
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    // Usage errors exit with status 2 from here
    let cli = Cli::parse();
    logger::init(cli.verbose);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("bootgpt: {err:#}");
            if let Some(hint) = commands::recovery_hint(&err) {
                eprintln!("bootgpt: {hint}");
            }
            ExitCode::from(commands::exit_status(&err))
        }
    }
}
