use std::collections::{HashMap, HashSet};

use anyhow::{bail, ensure, Context, Result};
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

use super::{GateOp, Operand, Source, Tap, Wiring};
use crate::utils::parse_literal;

#[derive(Parser)]
#[grammar = "src/wiring/grammar.pest"] // relative to the crate root
struct WiringParser;

/// Parse a wiring written in the text format.
///
/// ```text
/// circuit HalfAdder;
/// input A;
/// input B;
/// output S[2];
/// family x : XOR[1];
/// family c : AND[1];
/// x.a <- A:0;
/// x.b <- B:0;
/// c.a <- A:0;
/// c.b <- B:0;
/// S <- x[0], c[0];
/// ```
///
/// Selections are written `source:lane`. A source is an input bit, a family
/// lane (prefixed by `@` to read the previous tick) or a constant `0`/`1`.
/// Families are evaluated in declaration order and may be referenced before
/// they are declared.
pub fn parse(src: &str) -> Result<Wiring> {
    let mut pairs = WiringParser::parse(Rule::main, src)
        .context("fail to parse wiring source")?
        .next()
        .context("empty wiring source")?
        .into_inner();

    let header = pairs.next().context("missing circuit declaration")?;
    let mut wiring = Wiring::new(inner_ident(header)?);

    let decls: Vec<Pair<'_, Rule>> = pairs.filter(|p| p.as_rule() != Rule::EOI).collect();

    // declarations first, so that statements may refer forward
    let mut declared_outputs = Vec::new();
    for decl in &decls {
        let line = decl.as_span().start_pos().line_col().0;
        match decl.as_rule() {
            Rule::input_decl => {
                let (name, width) = port_decl(decl.clone())?;
                wiring.add_input(&name, width.unwrap_or(1));
            }
            Rule::output_decl => declared_outputs.push(port_decl(decl.clone())?),
            Rule::family_decl => {
                let mut it = decl.clone().into_inner();
                let name = next_str(&mut it)?;
                let op = next_str(&mut it)?
                    .parse::<GateOp>()
                    .with_context(|| format!("line {line}"))?;
                let lanes = number(it.next())?;
                wiring.add_family(name, op, lanes);
            }
            _ => {}
        }
    }

    let inputs: HashSet<String> = wiring.inputs.iter().map(|p| p.name.clone()).collect();
    let mut assigned: HashMap<String, Vec<Tap>> = HashMap::new();
    for decl in decls {
        let line = decl.as_span().start_pos().line_col().0;
        match decl.as_rule() {
            Rule::operand_stmt => {
                operand_stmt(&mut wiring, &inputs, decl).with_context(|| format!("line {line}"))?
            }
            Rule::output_stmt => {
                let mut it = decl.into_inner();
                let name = next_str(&mut it)?.to_string();
                let taps = it
                    .map(|pair| tap(&inputs, pair))
                    .collect::<Result<Vec<_>>>()
                    .with_context(|| format!("line {line}"))?;
                if assigned.insert(name.clone(), taps).is_some() {
                    bail!("line {line}: output `{name}` is assigned more than once")
                }
            }
            _ => {}
        }
    }

    for (name, width) in declared_outputs {
        let taps = assigned
            .remove(&name)
            .with_context(|| format!("output `{name}` is never assigned"))?;
        if let Some(width) = width {
            ensure!(
                width as usize == taps.len(),
                "output `{name}` is declared with width {width} but has {} taps",
                taps.len()
            );
        }
        wiring.add_output(&name, taps);
    }
    if let Some(name) = assigned.keys().next() {
        bail!("`{name}` is assigned but not declared as an output")
    }

    Ok(wiring)
}

fn inner_ident(pair: Pair<'_, Rule>) -> Result<&str> {
    next_str(&mut pair.into_inner())
}

fn next_str<'i>(it: &mut impl Iterator<Item = Pair<'i, Rule>>) -> Result<&'i str> {
    Ok(it.next().context("unexpected end of statement")?.as_str())
}

fn number(pair: Option<Pair<'_, Rule>>) -> Result<u32> {
    let text = pair.context("missing number")?.as_str();
    let value = parse_literal(text).with_context(|| format!("invalid number `{text}`"))?;
    u32::try_from(value).with_context(|| format!("number `{text}` is too large"))
}

/// `input A[4];` or `output S;`
fn port_decl(pair: Pair<'_, Rule>) -> Result<(String, Option<u32>)> {
    let mut it = pair.into_inner();
    let name = next_str(&mut it)?.to_string();
    let width = match it.next() {
        Some(pair) => Some(number(Some(pair))?),
        None => None,
    };
    Ok((name, width))
}

/// `name` or `name[i]`
fn bit_ref(pair: Pair<'_, Rule>) -> Result<(&str, u32)> {
    let mut it = pair.into_inner();
    let name = next_str(&mut it)?;
    let index = match it.next() {
        Some(pair) => number(Some(pair))?,
        None => 0,
    };
    Ok((name, index))
}

fn source(inputs: &HashSet<String>, pair: Pair<'_, Rule>) -> Result<Source> {
    Ok(match pair.as_rule() {
        Rule::constant => Source::Const(pair.as_str() == "1"),
        Rule::bit_ref => {
            let (name, index) = bit_ref(pair)?;
            if inputs.contains(name) {
                Source::input(name, index)
            } else {
                Source::now(name, index)
            }
        }
        Rule::prev_ref => {
            let inner = pair.into_inner().next().context("missing signal")?;
            let (name, index) = bit_ref(inner)?;
            ensure!(
                !inputs.contains(name),
                "input `{name}` has no previous-tick value"
            );
            Source::prev(name, index)
        }
        rule => bail!("unexpected {rule:?} in selection"),
    })
}

fn tap(inputs: &HashSet<String>, pair: Pair<'_, Rule>) -> Result<Tap> {
    Ok(match pair.as_rule() {
        Rule::constant => Tap::Const(pair.as_str() == "1"),
        Rule::bit_ref => {
            let (name, index) = bit_ref(pair)?;
            if inputs.contains(name) {
                Tap::input(name, index)
            } else {
                Tap::family(name, index)
            }
        }
        rule => bail!("unexpected {rule:?} in output"),
    })
}

/// `x.a <- A[0]:0, @y[1]:1;`
fn operand_stmt(wiring: &mut Wiring, inputs: &HashSet<String>, pair: Pair<'_, Rule>) -> Result<()> {
    let mut it = pair.into_inner();
    let family = next_str(&mut it)?;
    let operand = match next_str(&mut it)? {
        "a" | "A" => Operand::A,
        _ => Operand::B,
    };
    let def = wiring
        .family_mut(family)
        .with_context(|| format!("unknown family `{family}`"))?;
    for selection in it {
        let mut parts = selection.into_inner();
        let src = source(inputs, parts.next().context("missing source")?)?;
        let lane = number(parts.next())?;
        def.connect(operand, src, lane);
    }
    Ok(())
}
