//! Ratcliff/Obershelp sequence matching.
//!
//! Produces the same matching blocks, ratios and opcodes as the classic
//! `SequenceMatcher` with no junk predicate and auto-junk enabled: in a
//! second sequence of 200 or more elements, any element occurring more than
//! `len / 100 + 1` times is treated as popular and never seeds a match.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Minimum second-sequence length for popular-element pruning.
const AUTOJUNK_MIN_LEN: usize = 200;

/// `a[a_start..a_start + size] == b[b_start..b_start + size]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Match {
    pub a_start: usize,
    pub b_start: usize,
    pub size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpTag {
    Equal,
    Replace,
    Delete,
    Insert,
}

/// Turn `a[a1..a2]` into `b[b1..b2]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opcode {
    pub tag: OpTag,
    pub a1: usize,
    pub a2: usize,
    pub b1: usize,
    pub b2: usize,
}

pub struct SequenceMatcher<'a, T> {
    a: &'a [T],
    b: &'a [T],
    b2j: HashMap<&'a T, Vec<usize>>,
}

impl<'a, T: Eq + Hash> SequenceMatcher<'a, T> {
    pub fn new(a: &'a [T], b: &'a [T]) -> Self {
        let mut b2j: HashMap<&'a T, Vec<usize>> = HashMap::new();
        for (j, elt) in b.iter().enumerate() {
            b2j.entry(elt).or_default().push(j);
        }

        let n = b.len();
        if n >= AUTOJUNK_MIN_LEN {
            let ntest = n / 100 + 1;
            let popular: HashSet<&'a T> = b2j
                .iter()
                .filter(|(_, idxs)| idxs.len() > ntest)
                .map(|(elt, _)| *elt)
                .collect();
            for elt in popular {
                b2j.remove(elt);
            }
        }

        Self { a, b, b2j }
    }

    /// Longest matching block in `a[alo..ahi]` and `b[blo..bhi]`.
    ///
    /// Ties resolve to the earliest start in `a`, then in `b`.
    pub fn find_longest_match(&self, alo: usize, ahi: usize, blo: usize, bhi: usize) -> Match {
        let (a, b) = (self.a, self.b);
        let (mut besti, mut bestj, mut bestsize) = (alo, blo, 0usize);

        let mut j2len: HashMap<usize, usize> = HashMap::new();
        for (i, elt) in a.iter().enumerate().take(ahi).skip(alo) {
            let mut new_j2len: HashMap<usize, usize> = HashMap::new();
            if let Some(indices) = self.b2j.get(elt) {
                for &j in indices {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let prev = if j > 0 {
                        j2len.get(&(j - 1)).copied().unwrap_or(0)
                    } else {
                        0
                    };
                    let k = prev + 1;
                    new_j2len.insert(j, k);
                    if k > bestsize {
                        besti = i + 1 - k;
                        bestj = j + 1 - k;
                        bestsize = k;
                    }
                }
            }
            j2len = new_j2len;
        }

        // Extend across elements that were pruned as popular.
        while besti > alo && bestj > blo && a[besti - 1] == b[bestj - 1] {
            besti -= 1;
            bestj -= 1;
            bestsize += 1;
        }
        while besti + bestsize < ahi
            && bestj + bestsize < bhi
            && a[besti + bestsize] == b[bestj + bestsize]
        {
            bestsize += 1;
        }

        Match {
            a_start: besti,
            b_start: bestj,
            size: bestsize,
        }
    }

    /// Non-adjacent matching blocks in ascending order, terminated by a
    /// zero-size sentinel at `(len(a), len(b))`.
    pub fn matching_blocks(&self) -> Vec<Match> {
        let (la, lb) = (self.a.len(), self.b.len());
        let mut queue = vec![(0, la, 0, lb)];
        let mut blocks = Vec::new();

        while let Some((alo, ahi, blo, bhi)) = queue.pop() {
            let m = self.find_longest_match(alo, ahi, blo, bhi);
            if m.size > 0 {
                blocks.push(m);
                if alo < m.a_start && blo < m.b_start {
                    queue.push((alo, m.a_start, blo, m.b_start));
                }
                if m.a_start + m.size < ahi && m.b_start + m.size < bhi {
                    queue.push((m.a_start + m.size, ahi, m.b_start + m.size, bhi));
                }
            }
        }
        blocks.sort();

        let mut collapsed = Vec::with_capacity(blocks.len() + 1);
        let (mut i1, mut j1, mut k1) = (0, 0, 0);
        for m in blocks {
            if i1 + k1 == m.a_start && j1 + k1 == m.b_start {
                k1 += m.size;
            } else {
                if k1 > 0 {
                    collapsed.push(Match {
                        a_start: i1,
                        b_start: j1,
                        size: k1,
                    });
                }
                i1 = m.a_start;
                j1 = m.b_start;
                k1 = m.size;
            }
        }
        if k1 > 0 {
            collapsed.push(Match {
                a_start: i1,
                b_start: j1,
                size: k1,
            });
        }
        collapsed.push(Match {
            a_start: la,
            b_start: lb,
            size: 0,
        });
        collapsed
    }

    /// `2 * matches / (len(a) + len(b))`, or 1.0 when both are empty.
    pub fn ratio(&self) -> f64 {
        let total = self.a.len() + self.b.len();
        if total == 0 {
            return 1.0;
        }
        let matches: usize = self.matching_blocks().iter().map(|m| m.size).sum();
        2.0 * matches as f64 / total as f64
    }

    pub fn opcodes(&self) -> Vec<Opcode> {
        let (mut i, mut j) = (0, 0);
        let mut codes = Vec::new();
        for m in self.matching_blocks() {
            let tag = if i < m.a_start && j < m.b_start {
                Some(OpTag::Replace)
            } else if i < m.a_start {
                Some(OpTag::Delete)
            } else if j < m.b_start {
                Some(OpTag::Insert)
            } else {
                None
            };
            if let Some(tag) = tag {
                codes.push(Opcode {
                    tag,
                    a1: i,
                    a2: m.a_start,
                    b1: j,
                    b2: m.b_start,
                });
            }
            i = m.a_start + m.size;
            j = m.b_start + m.size;
            if m.size > 0 {
                codes.push(Opcode {
                    tag: OpTag::Equal,
                    a1: m.a_start,
                    a2: i,
                    b1: m.b_start,
                    b2: j,
                });
            }
        }
        codes
    }

    /// Opcodes clustered into hunks with up to `context` lines of context.
    pub fn grouped_opcodes(&self, context: usize) -> Vec<Vec<Opcode>> {
        let mut codes = self.opcodes();
        if codes.is_empty() {
            codes.push(Opcode {
                tag: OpTag::Equal,
                a1: 0,
                a2: 1,
                b1: 0,
                b2: 1,
            });
        }
        if let Some(first) = codes.first_mut() {
            if first.tag == OpTag::Equal {
                first.a1 = first.a1.max(first.a2.saturating_sub(context));
                first.b1 = first.b1.max(first.b2.saturating_sub(context));
            }
        }
        if let Some(last) = codes.last_mut() {
            if last.tag == OpTag::Equal {
                last.a2 = last.a2.min(last.a1 + context);
                last.b2 = last.b2.min(last.b1 + context);
            }
        }

        let span = context * 2;
        let mut groups = Vec::new();
        let mut group = Vec::new();
        for mut code in codes {
            if code.tag == OpTag::Equal && code.a2 - code.a1 > span {
                group.push(Opcode {
                    a2: code.a2.min(code.a1 + context),
                    b2: code.b2.min(code.b1 + context),
                    ..code
                });
                groups.push(std::mem::take(&mut group));
                code.a1 = code.a1.max(code.a2.saturating_sub(context));
                code.b1 = code.b1.max(code.b2.saturating_sub(context));
            }
            group.push(code);
        }
        if !group.is_empty() && !(group.len() == 1 && group[0].tag == OpTag::Equal) {
            groups.push(group);
        }
        groups
    }
}

/// Split after every line boundary, keeping the terminators.
///
/// Recognises `\n`, `\r\n`, `\r`, vertical tab, form feed, the file, group
/// and record separators, NEL and the Unicode line and paragraph separators.
pub fn split_lines_keep_ends(text: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((idx, ch)) = chars.next() {
        let end = match ch {
            '\r' => match chars.peek() {
                Some((_, '\n')) => {
                    chars.next();
                    idx + 2
                }
                _ => idx + 1,
            },
            '\n' | '\x0b' | '\x0c' | '\x1c' | '\x1d' | '\x1e' | '\u{85}' | '\u{2028}'
            | '\u{2029}' => idx + ch.len_utf8(),
            _ => continue,
        };
        lines.push(&text[start..end]);
        start = end;
    }
    if start < text.len() {
        lines.push(&text[start..]);
    }
    lines
}

/// Unified diff of two line sequences without file headers' names.
///
/// Emits `---`/`+++` headers, `@@` hunk markers and ` `/`-`/`+` prefixed
/// lines with 3 lines of context. Empty when the inputs are equal.
pub fn unified_diff(a: &[&str], b: &[&str]) -> Vec<String> {
    let matcher = SequenceMatcher::new(a, b);
    let groups = matcher.grouped_opcodes(3);
    let mut out = Vec::new();
    if groups.is_empty() {
        return out;
    }
    out.push("--- ".to_string());
    out.push("+++ ".to_string());

    for group in groups {
        let (first, last) = (group[0], group[group.len() - 1]);
        out.push(format!(
            "@@ -{} +{} @@",
            format_range(first.a1, last.a2),
            format_range(first.b1, last.b2)
        ));
        for code in group {
            match code.tag {
                OpTag::Equal => {
                    out.extend(a[code.a1..code.a2].iter().map(|l| format!(" {}", l)));
                }
                OpTag::Replace | OpTag::Delete | OpTag::Insert => {
                    if matches!(code.tag, OpTag::Replace | OpTag::Delete) {
                        out.extend(a[code.a1..code.a2].iter().map(|l| format!("-{}", l)));
                    }
                    if matches!(code.tag, OpTag::Replace | OpTag::Insert) {
                        out.extend(b[code.b1..code.b2].iter().map(|l| format!("+{}", l)));
                    }
                }
            }
        }
    }
    out
}

fn format_range(start: usize, stop: usize) -> String {
    let mut beginning = start + 1;
    let length = stop - start;
    if length == 1 {
        return beginning.to_string();
    }
    if length == 0 {
        beginning -= 1;
    }
    format!("{},{}", beginning, length)
}
