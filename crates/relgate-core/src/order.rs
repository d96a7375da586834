use std::cmp::Ordering;

use crate::error::GateError;
use crate::ids::GateId;

/// Total order over gate identifiers. The first gate has no predecessor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GateOrder {
    gates: Vec<GateId>,
}

impl GateOrder {
    /// Keeps the configured order as given, dropping repeated ids.
    pub fn explicit(gates: impl IntoIterator<Item = GateId>) -> Self {
        let mut out: Vec<GateId> = Vec::new();
        for g in gates {
            if !out.contains(&g) {
                out.push(g);
            }
        }
        Self { gates: out }
    }

    /// Orders ids naturally, so "G7.2" < "G7.10".
    pub fn natural(gates: impl IntoIterator<Item = GateId>) -> Self {
        let mut out: Vec<GateId> = gates.into_iter().collect();
        out.sort_by(|a, b| natural_cmp(a.as_str(), b.as_str()));
        out.dedup();
        Self { gates: out }
    }

    pub fn gates(&self) -> &[GateId] {
        &self.gates
    }

    pub fn first(&self) -> Option<&GateId> {
        self.gates.first()
    }

    pub fn contains(&self, gate: &GateId) -> bool {
        self.gates.contains(gate)
    }

    /// `Ok(None)` only for the first gate.
    pub fn prior(&self, gate: &GateId) -> Result<Option<&GateId>, GateError> {
        let idx = self
            .gates
            .iter()
            .position(|g| g == gate)
            .ok_or_else(|| GateError::UnknownGate(gate.clone()))?;
        Ok(if idx == 0 { None } else { self.gates.get(idx - 1) })
    }

    pub fn next(&self, gate: &GateId) -> Option<&GateId> {
        let idx = self.gates.iter().position(|g| g == gate)?;
        self.gates.get(idx + 1)
    }
}

/// Compare strings treating runs of ASCII digits as numbers.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut ai = a.chars().peekable();
    let mut bi = b.chars().peekable();
    loop {
        match (ai.peek().copied(), bi.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let na = take_digits(&mut ai);
                let nb = take_digits(&mut bi);
                let ord = na
                    .trim_start_matches('0')
                    .len()
                    .cmp(&nb.trim_start_matches('0').len())
                    .then_with(|| na.trim_start_matches('0').cmp(nb.trim_start_matches('0')))
                    .then_with(|| na.len().cmp(&nb.len()));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(&y);
                }
                ai.next();
                bi.next();
            }
        }
    }
}

fn take_digits(it: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut s = String::new();
    while let Some(c) = it.peek().copied() {
        if !c.is_ascii_digit() {
            break;
        }
        s.push(c);
        it.next();
    }
    s
}
