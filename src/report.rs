//! gmon-profile text reports of a profile.

use std::io::Write;

use crate::config::PADDING;
use crate::error::Result;
use crate::tree::{Profile, SymbolRef};

/// Name of the file holding symbols without debug information.
const UNKNOWN_FILE: &str = "???";

/// Writes the profile in one of `config::FORMATS`.
pub fn write(profile: &Profile, format: &str, output: impl Write) -> Result<()> {
    match format {
        "callgraph" => write_callgraph(profile, output),
        "callgrind" => write_callgrind(profile, output),
        _ => write_tree(profile, output),
    }
}

/// Name of a symbol followed by its cycle, if any.
fn display_name(symbol: &SymbolRef) -> String {
    match symbol.cycle() {
        Some(cycle) => format!("{} <cycle {}>", symbol.name(), cycle.number()),
        None => symbol.name().to_string(),
    }
}

/// Writes the files of the profile with their symbols, heaviest first.
pub fn write_tree(profile: &Profile, mut output: impl Write) -> Result<()> {
    writeln!(
        output,
        "# {} samples ({} attributed, {} unattributed) from {} gmon file(s)",
        profile.total_samples(),
        profile.attributed_samples(),
        profile.unattributed_samples(),
        profile.sources()
    )?;
    if let Some(h) = profile.histogram() {
        writeln!(
            output,
            "# each sample counts as {} {}",
            profile.seconds(1.0),
            h.dimension
        )?;
    }
    if profile.basic_block_total() != 0 {
        writeln!(output, "# basic block executions: {}", profile.basic_block_total())?;
    }
    writeln!(
        output,
        "{:<40} {:>8} {:>10} {:>10} {:>10}",
        "name", "% time", "self", "cumulative", "calls"
    )?;

    for file in profile.files() {
        writeln!(
            output,
            "{:<40} {:>8.2} {:>10.2}",
            file.path().unwrap_or(UNKNOWN_FILE),
            file.percentage(),
            file.self_seconds()
        )?;
        for symbol in file.symbols() {
            writeln!(
                output,
                "{}{:<36} {:>8.2} {:>10.2} {:>10.2} {:>10}",
                PADDING,
                display_name(&symbol),
                symbol.percentage(),
                symbol.self_seconds(),
                symbol.cumulative_seconds(),
                symbol.calls_in()
            )?;
        }
    }

    for diagnostic in profile.diagnostics() {
        writeln!(output, "# warning: {}", diagnostic)?;
    }
    output.flush()?;
    Ok(())
}

/// Writes a gprof-like call graph: every symbol with its callers above and
/// its callees below, ordered by cumulative time.
pub fn write_callgraph(profile: &Profile, mut output: impl Write) -> Result<()> {
    let mut symbols: Vec<SymbolRef> = profile
        .call_graph()
        .nodes()
        .iter()
        .filter_map(|node| profile.symbol(node.symbol()))
        .collect();
    symbols.sort_by(|x, y| {
        y.cumulative_samples()
            .total_cmp(&x.cumulative_samples())
            .then_with(|| x.name().cmp(y.name()))
    });
    let number = |symbol: &SymbolRef| {
        symbols
            .iter()
            .position(|s| s.id() == symbol.id())
            .map_or(0, |i| i + 1)
    };

    writeln!(
        output,
        "{:<6} {:>6} {:>8} {:>8} {:>12}  name",
        "index", "% time", "self", "children", "called"
    )?;
    for (i, symbol) in symbols.iter().enumerate() {
        for edge in symbol.callers() {
            let caller = edge.peer();
            writeln!(
                output,
                "{:<6} {:>6} {:>8} {:>8.2} {:>12}      {} [{}]",
                "",
                "",
                "",
                edge.propagated_seconds(),
                format!("{}/{}", edge.count(), symbol.calls_in() + symbol.self_calls()),
                display_name(&caller),
                number(&caller)
            )?;
        }

        let called = match symbol.self_calls() {
            0 => symbol.calls_in().to_string(),
            n => format!("{}+{}", symbol.calls_in(), n),
        };
        writeln!(
            output,
            "{:<6} {:>6.1} {:>8.2} {:>8.2} {:>12}  {} [{}]",
            format!("[{}]", i + 1),
            symbol.cumulative_percentage(),
            symbol.self_seconds(),
            symbol.cumulative_seconds() - symbol.self_seconds(),
            called,
            display_name(symbol),
            i + 1
        )?;

        for edge in symbol.callees() {
            let callee = edge.peer();
            writeln!(
                output,
                "{:<6} {:>6} {:>8} {:>8.2} {:>12}      {} [{}]",
                "",
                "",
                "",
                edge.propagated_seconds(),
                format!("{}/{}", edge.count(), callee.calls_in() + callee.self_calls()),
                display_name(&callee),
                number(&callee)
            )?;
        }
        writeln!(output, "{}", "-".repeat(64))?;
    }

    for cycle in profile.cycles() {
        let members: Vec<&str> = cycle
            .members()
            .iter()
            .map(|id| profile.table().symbol(*id).name())
            .collect();
        writeln!(
            output,
            "<cycle {} as a whole> self={:.2} cumulative={:.2} called={} internal={} head={} members={}",
            cycle.number(),
            profile.seconds(cycle.self_samples() as f64),
            profile.seconds(cycle.cumulative_samples()),
            cycle.external_calls(),
            cycle.internal_calls(),
            profile.table().symbol(cycle.head()).name(),
            members.join(",")
        )?;
    }

    output.flush()?;
    Ok(())
}

/// Writes the profile data in the callgrind file format.
/// See details of the format in the Valgrind documentation.
pub fn write_callgrind(profile: &Profile, mut output: impl Write) -> Result<()> {
    writeln!(output, "# callgrind format")?;
    writeln!(output, "version: 1")?;
    writeln!(output, "creator: gmon-profile")?;
    writeln!(output, "positions: instr")?;
    writeln!(output, "events: Samples")?;
    writeln!(output, "totals: {}", profile.attributed_samples())?;

    for file in profile.files() {
        let path = file.path().unwrap_or(UNKNOWN_FILE);
        writeln!(output)?;
        writeln!(output, "fl={}", path)?;
        for symbol in file.symbols() {
            let pc = symbol.symbol().start_address();
            writeln!(output, "fn={}", symbol.name())?;
            writeln!(output, "0x{:x} {}", pc, symbol.self_samples())?;
            for edge in symbol.callees() {
                let callee = edge.peer();
                let callee_path = callee.file().path().unwrap_or(UNKNOWN_FILE);
                if callee_path != path {
                    writeln!(output, "cfl={}", callee_path)?;
                }
                writeln!(output, "cfn={}", callee.name())?;
                writeln!(
                    output,
                    "calls={} 0x{:x}",
                    edge.count(),
                    callee.symbol().start_address()
                )?;
                writeln!(
                    output,
                    "0x{:x} {}",
                    pc,
                    edge.propagated_samples().round() as u64
                )?;
            }
        }
    }

    output.flush()?;
    Ok(())
}
