//! gmon-profile options parser.

use gmon_profile::config;
use gmon_profile::gmon::{ByteOrder, Layout};
use std::path::PathBuf;
use structopt::StructOpt;

#[derive(StructOpt)]
#[structopt(about = "gprof gmon data decoder and aggregator")]
pub struct Application {
    #[structopt(short, long, help = "Report progress of loading and decoding")]
    pub verbose: bool,

    #[structopt(subcommand)]
    pub cmd: Command,
}

/// Options describing the profiled target.
#[derive(StructOpt)]
pub struct Target {
    #[structopt(
        long,
        possible_values(&config::BYTE_ORDERS),
        default_value = &config::DEFAULT_BYTE_ORDER,
        help = "Byte order of the profiled target"
    )]
    pub byte_order: ByteOrder,

    #[structopt(
        long,
        possible_values(&config::ADDRESS_SIZES),
        default_value = &config::DEFAULT_ADDRESS_SIZE,
        help = "Address width of the profiled target in bytes"
    )]
    pub address_size: usize,

    #[structopt(
        long,
        possible_values(&config::COUNTER_SIZES),
        default_value = &config::DEFAULT_COUNTER_SIZE,
        help = "Width of the histogram counters in bytes"
    )]
    pub counter_size: usize,
}

impl Target {
    /// Returns the gmon layout of the target.
    pub fn layout(&self) -> Layout {
        Layout::gnu_v1(self.byte_order, self.address_size).with_counter_size(self.counter_size)
    }
}

#[derive(StructOpt)]
pub enum Command {
    #[structopt(about = "Aggregates gmon files into a profile")]
    Report {
        #[structopt(parse(from_os_str), required = true, help = "Paths to the input gmon files")]
        gmon: Vec<PathBuf>,

        #[structopt(
            parse(from_os_str),
            short,
            long,
            help = "Path to the symbol listing (nm --defined-only --print-size --line-numbers)"
        )]
        symbols: PathBuf,

        #[structopt(flatten)]
        target: Target,

        #[structopt(
            short,
            long,
            possible_values(&config::FORMATS),
            default_value = &config::DEFAULT_FORMAT,
            help = "Format of the generated report"
        )]
        format: String,

        #[structopt(
            parse(from_os_str),
            short,
            long,
            help = "Optional path to generated file (STDOUT otherwise)"
        )]
        output: Option<PathBuf>,
    },

    #[structopt(about = "Prints the decoded records of a gmon file")]
    Dump {
        #[structopt(parse(from_os_str), help = "Path to the input gmon file")]
        gmon: PathBuf,

        #[structopt(flatten)]
        target: Target,
    },
}

/// Constructs an instance of the Application.
pub fn application() -> Application {
    Application::from_args()
}
