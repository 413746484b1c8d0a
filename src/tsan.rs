//! ThreadSanitizerのデータ競合レポートを解析し、競合した変数を根とするコールグラフを作る。
//!
//! 対象とするのは次のような形式のレポートである。
//!
//! ```text
//! WARNING: ThreadSanitizer: data race (pid=8255)
//!   Read of size 4 at 0x563c4e70e154 by thread T2:
//!     #0 thread_function() /path/main.cpp:11 (untitled2+0x2459)
//!
//!   Previous write of size 4 at 0x563c4e70e154 by thread T1:
//!     #0 thread_function() /path/main.cpp:11 (untitled2+0x2471)
//!
//!   Location is global 'shared_variable' of size 4 at 0x563c4e70e154 (untitled2+0x000000008154)
//!
//!   Thread T2 (tid=8258, running) created by main thread at:
//!     #0 pthread_create ...
//!
//! SUMMARY: ThreadSanitizer: data race /path/main.cpp:11 in thread_function()
//! ```

use std::collections::HashMap;
use std::fmt;

use anyhow::{Context, Result, anyhow, bail};
use petgraph::dot::Dot;
use petgraph::graph::{DiGraph, NodeIndex};

const ROOT_COLOR: &str = "red";
const THREAD_COLORS: [&str; 4] = ["lightblue", "lightgreen", "lightgray", "lightcoral"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
}

/// スタックフレーム1つ分
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub index: usize,
    pub function: String,
    /// `file:line`。不明（`<null>`）の場合は`None`
    pub source: Option<String>,
    /// `binary+offset`
    pub module: Option<String>,
}

/// 競合したメモリアクセスと、その時点のスタック
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Access {
    pub kind: AccessKind,
    /// `Previous read/write`として報告された、先に行われたアクセスか
    pub previous: bool,
    pub size: u32,
    pub address: String,
    /// `T1`のようなスレッド名。メインスレッドの場合は`main thread`
    pub thread: String,
    pub frames: Vec<Frame>,
}

/// 競合したグローバル変数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub variable: String,
    pub size: Option<u32>,
    pub address: String,
    pub module: Option<String>,
}

/// 競合に関わったスレッドと、それを起動したスタック
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    pub id: String,
    pub tid: Option<u32>,
    pub creator: String,
    pub frames: Vec<Frame>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaceReport {
    pub pid: Option<u32>,
    pub accesses: Vec<Access>,
    pub location: Location,
    pub threads: Vec<ThreadInfo>,
    /// `SUMMARY:`行の`file:line in function`部分
    pub summary: Option<String>,
}

/// 直前に読んだ見出し行。続く`#N`行をどこに積むかを決める。
#[derive(Clone, Copy)]
enum Section {
    None,
    Access(usize),
    Thread(usize),
}

impl RaceReport {
    pub fn parse(text: &str) -> Result<Self> {
        let mut pid = None;
        let mut accesses: Vec<Access> = Vec::new();
        let mut location = None;
        let mut threads: Vec<ThreadInfo> = Vec::new();
        let mut summary = None;
        let mut section = Section::None;

        for (line_no, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                section = Section::None;
                continue;
            }

            if line.starts_with('#') {
                let frame = Frame::parse(line)
                    .with_context(|| format!("line {}: malformed stack frame", line_no + 1))?;
                match section {
                    Section::Access(i) => accesses[i].frames.push(frame),
                    Section::Thread(i) => threads[i].frames.push(frame),
                    Section::None => {}
                }
                continue;
            }

            section = Section::None;
            if let Some(rest) = line.strip_prefix("WARNING: ThreadSanitizer:") {
                pid = parse_pid(rest);
            } else if let Some(rest) = line.strip_prefix("Location is global ") {
                let parsed = Location::parse(rest)
                    .with_context(|| format!("line {}: malformed location", line_no + 1))?;
                location = Some(parsed);
            } else if let Some(rest) = line.strip_prefix("SUMMARY: ThreadSanitizer: data race ") {
                summary = Some(rest.to_owned());
            } else if let Some(access) = Access::parse_header(line)
                .with_context(|| format!("line {}: malformed access", line_no + 1))?
            {
                accesses.push(access);
                section = Section::Access(accesses.len() - 1);
            } else if let Some(thread) = ThreadInfo::parse_header(line) {
                threads.push(thread);
                section = Section::Thread(threads.len() - 1);
            }
        }

        if accesses.is_empty() {
            bail!("report contains no racing memory accesses");
        }
        let location =
            location.ok_or_else(|| anyhow!("report has no \"Location is global\" line"))?;

        Ok(Self {
            pid,
            accesses,
            location,
            threads,
            summary,
        })
    }

    /// グラフの根に付けるラベル
    pub fn title(&self) -> String {
        format!(
            "Race at {} ({})",
            self.location.variable, self.location.address
        )
    }
}

fn parse_pid(text: &str) -> Option<u32> {
    let (_, rest) = text.split_once("pid=")?;
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

impl Frame {
    fn parse(line: &str) -> Result<Self> {
        let mut tokens: Vec<&str> = line.split_whitespace().collect();
        let index = tokens
            .first()
            .and_then(|t| t.strip_prefix('#'))
            .and_then(|n| n.parse::<usize>().ok())
            .context("missing frame index")?;
        tokens.remove(0);

        let last = tokens.last().copied();
        let module = match last {
            Some(t) if tokens.len() > 1 && t.starts_with('(') && t.ends_with(')') => {
                tokens.pop();
                Some(t[1..t.len() - 1].to_owned())
            }
            _ => None,
        };
        let last = tokens.last().copied();
        let source = match last {
            Some(t) if tokens.len() > 1 && looks_like_source(t) => {
                tokens.pop();
                (t != "<null>").then(|| t.to_owned())
            }
            _ => None,
        };
        if tokens.is_empty() {
            bail!("missing function name");
        }

        Ok(Self {
            index,
            function: tokens.join(" "),
            source,
            module,
        })
    }
}

fn looks_like_source(token: &str) -> bool {
    token == "<null>"
        || token.contains('/')
        || token
            .rsplit_once(':')
            .is_some_and(|(_, line)| line.parse::<u32>().is_ok())
}

impl Access {
    /// `Read of size 4 at 0x... by thread T2:`の形式の行を読む。
    /// 見出し行でなければ`Ok(None)`を返す。
    fn parse_header(line: &str) -> Result<Option<Self>> {
        let Some(body) = line.strip_suffix(':') else {
            return Ok(None);
        };
        let Some((kind, rest)) = body.split_once(" of size ") else {
            return Ok(None);
        };
        let kind = kind.to_ascii_lowercase();
        let previous = kind.starts_with("previous");
        let kind = if kind.ends_with("read") {
            AccessKind::Read
        } else if kind.ends_with("write") {
            AccessKind::Write
        } else {
            return Ok(None);
        };

        let (size, rest) = rest.split_once(" at ").context("missing access address")?;
        let size = size
            .parse::<u32>()
            .with_context(|| format!("invalid access size {size:?}"))?;
        let (address, who) = rest.split_once(" by ").context("missing accessing thread")?;
        let thread = who.strip_prefix("thread ").unwrap_or(who);

        Ok(Some(Self {
            kind,
            previous,
            size,
            address: address.to_owned(),
            thread: thread.to_owned(),
            frames: Vec::new(),
        }))
    }
}

impl Location {
    /// `'shared_variable' of size 4 at 0x... (module+0x...)`を読む。
    fn parse(text: &str) -> Result<Self> {
        let (variable, rest) = text
            .strip_prefix('\'')
            .and_then(|t| t.split_once('\''))
            .context("missing quoted variable name")?;
        let size = rest
            .split_once("size ")
            .and_then(|(_, t)| t.split_whitespace().next())
            .and_then(|t| t.parse::<u32>().ok());
        let (_, after_at) = rest.split_once(" at ").context("missing variable address")?;
        let mut tokens = after_at.split_whitespace();
        let address = tokens.next().context("missing variable address")?;
        let module = tokens
            .next()
            .and_then(|t| t.strip_prefix('('))
            .and_then(|t| t.strip_suffix(')'))
            .map(str::to_owned);

        Ok(Self {
            variable: variable.to_owned(),
            size,
            address: address.to_owned(),
            module,
        })
    }
}

impl ThreadInfo {
    /// `Thread T2 (tid=8258, running) created by main thread at:`を読む。
    fn parse_header(line: &str) -> Option<Self> {
        let body = line.strip_prefix("Thread ")?.strip_suffix(" at:")?;
        let (head, creator) = body.split_once(" created by ")?;
        let id = head.split_whitespace().next()?;
        let tid = head.split_once("tid=").and_then(|(_, t)| {
            let digits: String = t.chars().take_while(char::is_ascii_digit).collect();
            digits.parse::<u32>().ok()
        });
        Some(Self {
            id: id.to_owned(),
            tid,
            creator: creator.to_owned(),
            frames: Vec::new(),
        })
    }
}

/// グラフのノード。DOTでは`label`と塗りつぶし色になる。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaceNode {
    pub label: String,
    pub fill: &'static str,
}

impl fmt::Display for RaceNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// 競合箇所を根とし、各アクセスのスタックを外側の関数から順にたどる有向グラフ
///
/// 辺の重みはそのスタックのスレッド名。同じスレッドの同じ関数は1つのノードにまとめる。
pub struct RaceGraph {
    graph: DiGraph<RaceNode, String>,
    root: NodeIndex,
}

impl RaceGraph {
    pub fn build(report: &RaceReport) -> Self {
        let mut graph = DiGraph::new();
        let root = graph.add_node(RaceNode {
            label: report.title(),
            fill: ROOT_COLOR,
        });

        let mut nodes: HashMap<(&str, &str), NodeIndex> = HashMap::new();
        let mut thread_order: Vec<&str> = Vec::new();
        for access in &report.accesses {
            let color = match thread_order.iter().position(|t| *t == access.thread) {
                Some(i) => i,
                None => {
                    thread_order.push(&access.thread);
                    thread_order.len() - 1
                }
            };
            let fill = THREAD_COLORS[color % THREAD_COLORS.len()];

            let mut previous = root;
            for frame in access.frames.iter().rev() {
                let node = *nodes
                    .entry((access.thread.as_str(), frame.function.as_str()))
                    .or_insert_with(|| {
                        graph.add_node(RaceNode {
                            label: frame.function.clone(),
                            fill,
                        })
                    });
                graph.update_edge(previous, node, access.thread.clone());
                previous = node;
            }
        }

        Self { graph, root }
    }

    pub fn root(&self) -> NodeIndex {
        self.root
    }

    pub fn graph(&self) -> &DiGraph<RaceNode, String> {
        &self.graph
    }

    /// Graphvizで描画できるDOT形式
    pub fn to_dot(&self) -> String {
        let dot = Dot::with_attr_getters(
            &self.graph,
            &[],
            &|_, _| String::new(),
            &|_, (_, node)| format!("style=filled, fillcolor={}", node.fill),
        );
        format!("{dot}")
    }
}
