//! Netlist Parser (component K): turns netlist text into a [`NodeTable`],
//! a [`Netlist`], and a [`Commands`]. Comments (`*`, `;`) and blank lines are
//! dropped, `+`-continuation lines are folded into the line above, and
//! everything from `.END` onward is ignored. Element lines are dispatched on
//! their first character; directive lines are collected and processed after
//! every element has been registered, so a `.DC` referencing an unknown
//! source is rejected against a complete netlist.

use nom::{
    branch::alt,
    bytes::complete::{tag_no_case, take_while},
    combinator::{opt, value},
    number::complete::double,
    IResult,
};
use regex::Regex;

use crate::commands::{Commands, DcSweepSpec, Options, SweepKind, TransientMethod, TransientSpec};
use crate::error::SpicError;
use crate::netlist::{Bjt, Diode, Mosfet, Netlist, Passive, Source};
use crate::node_table::NodeTable;
use crate::waveform::{ExpWaveform, PulseWaveform, PwlWaveform, SinWaveform, Waveform};

pub struct ParsedNetlist {
    pub node_table: NodeTable,
    pub netlist: Netlist,
    pub commands: Commands,
}

pub fn parse_file(path: &str) -> Result<ParsedNetlist, SpicError> {
    let content = std::fs::read_to_string(path)?;
    parse_netlist(&content)
}

pub fn parse_netlist(content: &str) -> Result<ParsedNetlist, SpicError> {
    let lines = preprocess_lines(content);
    if lines.is_empty() {
        return Err(SpicError::Parse("empty netlist".to_string()));
    }

    let title = lines[0].clone();
    let mut node_table = NodeTable::new();
    let mut netlist = Netlist::new(title);
    let mut directive_lines: Vec<String> = Vec::new();

    for line in &lines[1..] {
        let first_word = line.split_whitespace().next().unwrap_or("");
        if first_word.eq_ignore_ascii_case(".end") {
            break;
        }
        if line.starts_with('.') {
            directive_lines.push(line.clone());
        } else {
            parse_element_line(line, &mut node_table, &mut netlist)?;
        }
    }

    let mut commands = Commands::new(Options::default());
    process_directives(&directive_lines, &netlist, &mut commands)?;

    Ok(ParsedNetlist {
        node_table,
        netlist,
        commands,
    })
}

/// Folds `+`-continuations into the line above, drops comments and blank
/// lines, and returns one entry per logical line (the first is the title).
fn preprocess_lines(content: &str) -> Vec<String> {
    let mut processed = Vec::new();
    let mut current = String::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with('*') || line.starts_with(';') {
            continue;
        }
        if line.starts_with('+') {
            current.push(' ');
            current.push_str(line[1..].trim());
        } else {
            if !current.is_empty() {
                processed.push(current.clone());
            }
            current = line.to_string();
        }
    }
    if !current.is_empty() {
        processed.push(current);
    }
    processed
}

/// Splits the first `n` whitespace-delimited tokens off `line`, returning
/// them alongside the untouched remainder (so waveform descriptors further
/// down the line keep their internal spacing).
fn take_tokens(line: &str, n: usize) -> (Vec<&str>, &str) {
    let mut rest = line;
    let mut tokens = Vec::with_capacity(n);
    for _ in 0..n {
        rest = rest.trim_start();
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        tokens.push(&rest[..end]);
        rest = &rest[end..];
    }
    (tokens, rest.trim_start())
}

fn parse_element_line(line: &str, node_table: &mut NodeTable, netlist: &mut Netlist) -> Result<(), SpicError> {
    let kind = line
        .chars()
        .next()
        .ok_or_else(|| SpicError::Parse("empty element line".to_string()))?
        .to_ascii_uppercase();

    match kind {
        'R' | 'C' | 'L' => {
            let (tokens, _rest) = take_tokens(line, 4);
            if tokens.iter().any(|t| t.is_empty()) {
                return Err(SpicError::Parse(format!("malformed element line: {}", line)));
            }
            let el = Passive {
                name: tokens[0].to_string(),
                pos: node_table.append_node(tokens[1]),
                neg: node_table.append_node(tokens[2]),
                value: parse_value_with_unit(tokens[3])?,
            };
            match kind {
                'R' => netlist.add_resistor(el)?,
                'C' => netlist.add_capacitor(el)?,
                'L' => netlist.add_inductor(el)?,
                _ => unreachable!(),
            };
            Ok(())
        }
        'V' | 'I' => {
            let (tokens, rest) = take_tokens(line, 3);
            if tokens.iter().any(|t| t.is_empty()) {
                return Err(SpicError::Parse(format!("malformed source line: {}", line)));
            }
            let pos = node_table.append_node(tokens[1]);
            let neg = node_table.append_node(tokens[2]);
            let (dc_value, waveform) = parse_source_tail(rest)?;
            let el = Source {
                name: tokens[0].to_string(),
                pos,
                neg,
                dc_value,
                waveform,
            };
            match kind {
                'V' => netlist.add_voltage_source(el)?,
                'I' => netlist.add_current_source(el)?,
                _ => unreachable!(),
            };
            Ok(())
        }
        'D' => {
            let (tokens, rest) = take_tokens(line, 3);
            if tokens.iter().any(|t| t.is_empty()) {
                return Err(SpicError::Parse(format!("malformed diode line: {}", line)));
            }
            netlist.add_diode(Diode {
                name: tokens[0].to_string(),
                anode: node_table.append_node(tokens[1]),
                cathode: node_table.append_node(tokens[2]),
                model: optional_model(rest),
            })?;
            Ok(())
        }
        'M' => {
            let (tokens, rest) = take_tokens(line, 5);
            if tokens.iter().any(|t| t.is_empty()) {
                return Err(SpicError::Parse(format!("malformed mosfet line: {}", line)));
            }
            netlist.add_mosfet(Mosfet {
                name: tokens[0].to_string(),
                drain: node_table.append_node(tokens[1]),
                gate: node_table.append_node(tokens[2]),
                source: node_table.append_node(tokens[3]),
                bulk: node_table.append_node(tokens[4]),
                model: optional_model(rest),
            })?;
            Ok(())
        }
        'Q' => {
            let (tokens, rest) = take_tokens(line, 4);
            if tokens.iter().any(|t| t.is_empty()) {
                return Err(SpicError::Parse(format!("malformed bjt line: {}", line)));
            }
            netlist.add_bjt(Bjt {
                name: tokens[0].to_string(),
                collector: node_table.append_node(tokens[1]),
                base: node_table.append_node(tokens[2]),
                emitter: node_table.append_node(tokens[3]),
                model: optional_model(rest),
            })?;
            Ok(())
        }
        other => Err(SpicError::Parse(format!(
            "unrecognized element prefix '{}' in line: {}",
            other, line
        ))),
    }
}

fn optional_model(rest: &str) -> Option<String> {
    let rest = rest.trim();
    if rest.is_empty() {
        None
    } else {
        Some(rest.to_string())
    }
}

/// Parses a source's value tail: an optional leading `DC` keyword, the DC
/// value, and an optional waveform descriptor.
fn parse_source_tail(rest: &str) -> Result<(f64, Option<Waveform>), SpicError> {
    let mut rest = rest.trim();
    let first_space = rest.find(char::is_whitespace).unwrap_or(rest.len());
    if rest[..first_space].eq_ignore_ascii_case("dc") {
        rest = rest[first_space..].trim_start();
    }
    if rest.is_empty() {
        return Err(SpicError::Parse("source element is missing its DC value".to_string()));
    }

    let split_at = rest.find(char::is_whitespace).unwrap_or(rest.len());
    let dc_value = parse_value_with_unit(&rest[..split_at])?;
    let remainder = rest[split_at..].trim_start();
    let waveform = if remainder.is_empty() {
        None
    } else {
        Some(parse_waveform(remainder)?)
    };
    Ok((dc_value, waveform))
}

fn parse_waveform(text: &str) -> Result<Waveform, SpicError> {
    let trimmed = text.trim();
    let paren_idx = trimmed
        .find('(')
        .ok_or_else(|| SpicError::Parse(format!("expected a waveform descriptor, got: {}", trimmed)))?;
    let keyword = trimmed[..paren_idx].trim().to_uppercase();

    match keyword.as_str() {
        "EXP" => {
            let args = parse_flat_args(trimmed, paren_idx)?;
            if args.len() != 6 {
                return Err(SpicError::Parse(format!("EXP() expects 6 arguments, got {}", args.len())));
            }
            Ok(Waveform::Exp(ExpWaveform::new(
                args[0], args[1], args[2], args[3], args[4], args[5],
            )))
        }
        "SIN" => {
            let args = parse_flat_args(trimmed, paren_idx)?;
            if args.len() != 6 {
                return Err(SpicError::Parse(format!("SIN() expects 6 arguments, got {}", args.len())));
            }
            Ok(Waveform::Sin(SinWaveform::new(
                args[0], args[1], args[2], args[3], args[4], args[5],
            )))
        }
        "PULSE" => {
            let args = parse_flat_args(trimmed, paren_idx)?;
            if args.len() != 7 {
                return Err(SpicError::Parse(format!("PULSE() expects 7 arguments, got {}", args.len())));
            }
            Ok(Waveform::Pulse(PulseWaveform::new(
                args[0], args[1], args[2], args[3], args[4], args[5], args[6],
            )))
        }
        "PWL" => {
            let re = Regex::new(r"\(([^()]*)\)").unwrap();
            let mut points = Vec::new();
            for caps in re.captures_iter(&trimmed[paren_idx..]) {
                let pair: Vec<&str> = caps[1].split_whitespace().collect();
                if pair.len() != 2 {
                    return Err(SpicError::Parse(format!(
                        "PWL point needs a (t, v) pair, got: {}",
                        &caps[1]
                    )));
                }
                let t = parse_value_with_unit(pair[0])?;
                let v = parse_value_with_unit(pair[1])?;
                points.push((t, v));
            }
            if points.is_empty() {
                return Err(SpicError::Parse("PWL() has no points".to_string()));
            }
            Ok(Waveform::Pwl(PwlWaveform::new(points)))
        }
        other => Err(SpicError::Parse(format!("unrecognized waveform descriptor: {}", other))),
    }
}

fn parse_flat_args(trimmed: &str, paren_idx: usize) -> Result<Vec<f64>, SpicError> {
    let body = &trimmed[paren_idx + 1..];
    let inner = body.strip_suffix(')').unwrap_or(body);
    inner.split_whitespace().map(parse_value_with_unit).collect()
}

fn process_directives(lines: &[String], netlist: &Netlist, commands: &mut Commands) -> Result<(), SpicError> {
    for line in lines {
        let trimmed = line.trim();
        let mut tokens = trimmed.split_whitespace();
        let keyword = tokens.next().unwrap_or("").to_uppercase();
        let args: Vec<&str> = tokens.collect();

        match keyword.as_str() {
            ".OPTIONS" => apply_options_tokens(&args, &mut commands.options)?,
            ".DC" => {
                if args.len() != 4 {
                    return Err(SpicError::Parse(format!(".DC expects 4 arguments, got: {}", trimmed)));
                }
                let source_name = args[0].to_string();
                let kind = match source_name.chars().next().map(|c| c.to_ascii_uppercase()) {
                    Some('V') => SweepKind::Voltage,
                    Some('I') => SweepKind::Current,
                    _ => return Err(SpicError::Parse(format!(".DC source must start with V or I: {}", source_name))),
                };
                let spec = DcSweepSpec {
                    kind,
                    source_name,
                    start: parse_value_with_unit(args[1])?,
                    end: parse_value_with_unit(args[2])?,
                    step: parse_value_with_unit(args[3])?,
                };
                commands.add_dc_sweep(spec, netlist)?;
            }
            ".TRAN" => {
                if args.len() != 2 {
                    return Err(SpicError::Parse(format!(".TRAN expects 2 arguments, got: {}", trimmed)));
                }
                commands.transients.push(TransientSpec {
                    time_step: parse_value_with_unit(args[0])?,
                    fin_time: parse_value_with_unit(args[1])?,
                });
            }
            ".PRINT" => commands.print_nodes.extend(parse_print_plot_nodes(&args)?),
            ".PLOT" => commands.plot_nodes.extend(parse_print_plot_nodes(&args)?),
            other => return Err(SpicError::Parse(format!("unrecognized directive: {}", other))),
        }
    }
    Ok(())
}

fn apply_options_tokens(tokens: &[&str], options: &mut Options) -> Result<(), SpicError> {
    for tok in tokens {
        let upper = tok.to_uppercase();
        match upper.as_str() {
            "SPD" => options.spd = true,
            "CUSTOM" => options.custom = true,
            "SPARSE" => options.sparse = true,
            "ITER" => options.iter = true,
            _ if upper.starts_with("ITOL=") => {
                options.itol = upper["ITOL=".len()..]
                    .parse()
                    .map_err(|_| SpicError::Parse(format!("invalid ITOL value: {}", tok)))?;
            }
            _ if upper.starts_with("METHOD=") => {
                options.transient_method = match &upper["METHOD=".len()..] {
                    s if *s == "BE" => TransientMethod::BackwardEuler,
                    s if *s == "TR" => TransientMethod::Trapezoidal,
                    _ => return Err(SpicError::Parse(format!("unknown transient method: {}", tok))),
                };
            }
            _ => return Err(SpicError::Parse(format!("unrecognized .OPTIONS token: {}", tok))),
        }
    }
    Ok(())
}

fn parse_print_plot_nodes(tokens: &[&str]) -> Result<Vec<String>, SpicError> {
    let re = Regex::new(r"(?i)^V\(([^)]+)\)$").unwrap();
    tokens
        .iter()
        .map(|tok| {
            re.captures(tok)
                .map(|c| c[1].to_string())
                .ok_or_else(|| SpicError::Parse(format!("expected V(node) in .PRINT/.PLOT, got {}", tok)))
        })
        .collect()
}

fn value_with_unit(input: &str) -> IResult<&str, f64> {
    let (input, num) = double(input)?;
    let (input, mult) = opt(unit_multiplier)(input)?;
    let (input, _) = take_while(|c: char| c.is_alphabetic())(input)?;
    Ok((input, num * mult.unwrap_or(1.0)))
}

/// `MEG` is tried before the bare `M` so `1MEG` resolves to mega, not
/// milli-followed-by-a-stray-`EG`.
fn unit_multiplier(input: &str) -> IResult<&str, f64> {
    alt((
        value(1e12, tag_no_case("t")),
        value(1e9, tag_no_case("g")),
        value(1e6, tag_no_case("meg")),
        value(1e3, tag_no_case("k")),
        value(1e-3, tag_no_case("m")),
        value(1e-6, tag_no_case("u")),
        value(1e-9, tag_no_case("n")),
        value(1e-12, tag_no_case("p")),
        value(1e-15, tag_no_case("f")),
    ))(input)
}

pub fn parse_value_with_unit(token: &str) -> Result<f64, SpicError> {
    match value_with_unit(token.trim()) {
        Ok(("", v)) => Ok(v),
        _ => Err(SpicError::Parse(format!("invalid numeric value: {}", token))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_suffixes_resolve_correctly() {
        assert_eq!(parse_value_with_unit("1k").unwrap(), 1000.0);
        assert_eq!(parse_value_with_unit("1.5meg").unwrap(), 1.5e6);
        assert_eq!(parse_value_with_unit("1MEG").unwrap(), 1.0e6);
        assert_eq!(parse_value_with_unit("10m").unwrap(), 10e-3);
        assert_eq!(parse_value_with_unit("1u").unwrap(), 1e-6);
        assert_eq!(parse_value_with_unit("5V").unwrap(), 5.0);
        assert_eq!(parse_value_with_unit("1e-3").unwrap(), 1e-3);
    }

    #[test]
    fn parses_rc_divider_netlist() {
        let text = "Simple RC Circuit\nV1 1 0 DC 5V\nR1 1 2 1k\nC1 2 0 1u\n.PRINT V(2)\n.END\n";
        let parsed = parse_netlist(text).unwrap();
        assert_eq!(parsed.netlist.title, "Simple RC Circuit");
        assert_eq!(parsed.netlist.num_resistors(), 1);
        assert_eq!(parsed.netlist.num_capacitors(), 1);
        assert_eq!(parsed.netlist.num_voltage_sources(), 1);
        assert_eq!(parsed.commands.print_nodes, vec!["2".to_string()]);
        assert_eq!(parsed.netlist.resistors.elements[0].value, 1000.0);
    }

    #[test]
    fn continuation_lines_are_folded() {
        let text = "Title\nR1 1 2\n+ 1k\n.END\n";
        let parsed = parse_netlist(text).unwrap();
        assert_eq!(parsed.netlist.resistors.elements[0].value, 1000.0);
    }

    #[test]
    fn duplicate_element_name_is_fatal() {
        let text = "Title\nR1 1 2 1k\nR1 2 3 2k\n.END\n";
        let err = parse_netlist(text);
        assert!(matches!(err, Err(SpicError::DuplicateElement(_))));
    }

    #[test]
    fn dc_sweep_on_unknown_source_is_fatal() {
        let text = "Title\nR1 1 0 1k\n.DC V9 0 10 1\n.END\n";
        let err = parse_netlist(text);
        assert!(matches!(err, Err(SpicError::UnknownSource(_))));
    }

    #[test]
    fn options_directive_sets_flags_and_itol() {
        let text = "Title\nR1 1 0 1k\n.OPTIONS SPD ITER ITOL=1e-6 METHOD=TR\n.END\n";
        let parsed = parse_netlist(text).unwrap();
        assert!(parsed.commands.options.spd);
        assert!(parsed.commands.options.iter);
        assert_eq!(parsed.commands.options.itol, 1e-6);
        assert_eq!(parsed.commands.options.transient_method, TransientMethod::Trapezoidal);
    }

    #[test]
    fn pulse_waveform_is_parsed() {
        let text = "Title\nV1 1 0 PULSE(0 1 0 0 0 1 2)\nR1 1 0 1k\n.END\n";
        let parsed = parse_netlist(text).unwrap();
        let source = &parsed.netlist.voltage_sources.elements[0];
        assert!(matches!(source.waveform, Some(Waveform::Pulse(_))));
        assert_eq!(source.value_at(0.0), 0.0);
    }

    #[test]
    fn pwl_waveform_is_parsed() {
        let text = "Title\nV1 1 0 PWL(0 0)(1 5)(2 0)\nR1 1 0 1k\n.END\n";
        let parsed = parse_netlist(text).unwrap();
        let source = &parsed.netlist.voltage_sources.elements[0];
        assert!((source.value_at(0.5) - 2.5).abs() < 1e-9);
    }
}
