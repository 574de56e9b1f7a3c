use indextree::{Arena, NodeId};
use memchr::memchr2_iter;
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io;
use std::io::{BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

/// Interned label. Ids are handed out in first-seen order while parsing.
pub type LabelId = i32;

/// Maps a raw label string to its interned id and occurrence count.
pub type LabelDict = FxHashMap<String, (LabelId, usize)>;

pub type ParsedTree = Arena<LabelId>;

#[derive(Error, Debug)]
pub enum DatasetParseError {
    #[error(transparent)]
    IoError(#[from] io::Error),
    #[error(transparent)]
    ParseError(#[from] TreeParseError),
}

pub fn parse_dataset(
    dataset_file: impl AsRef<Path>,
    label_dict: &mut LabelDict,
) -> Result<Vec<ParsedTree>, DatasetParseError> {
    let f = File::open(dataset_file.as_ref())?;
    let reader = BufReader::new(f);
    let trees = reader
        .lines()
        .map(|line| parse_tree(line, label_dict))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(trees)
}

const TOKEN_START: u8 = b'{';
const TOKEN_END: u8 = b'}';
const ESCAPE_CHAR: u8 = b'\\';

#[inline(always)]
fn is_escaped(byte_string: &[u8], offset: usize) -> bool {
    offset > 0 && byte_string[offset - 1] == ESCAPE_CHAR
}

#[derive(Error, Debug)]
pub enum TreeParseError {
    #[error("tree string contains non ascii characters")]
    IsNotAscii,
    #[error(transparent)]
    LineReadError(#[from] io::Error),
    #[error("tree string has incorrect bracket notation format: {}", .0)]
    IncorrectFormat(String),
    #[error("Bad tokenizing")]
    TokenizerError,
}

fn intern(label: &[u8], label_dict: &mut LabelDict) -> LabelId {
    // Input was checked to be ASCII before tokenizing.
    let label = String::from_utf8(label.to_vec()).unwrap();
    let next_id = label_dict.len() as LabelId;
    let entry = label_dict.entry(label).or_insert((next_id, 0));
    entry.1 += 1;
    entry.0
}

pub fn parse_tree(
    tree_str: Result<String, io::Error>,
    label_dict: &mut LabelDict,
) -> Result<ParsedTree, TreeParseError> {
    use TreeParseError as TPE;

    let tree_str = tree_str?;
    if !tree_str.is_ascii() {
        return Err(TPE::IsNotAscii);
    }
    let mut tree = ParsedTree::new();
    let tree_bytes = tree_str.as_bytes();

    let token_positions: Vec<usize> = memchr2_iter(TOKEN_START, TOKEN_END, tree_bytes)
        .filter(|char_pos| !is_escaped(tree_bytes, *char_pos))
        .collect();

    if token_positions.len() < 2 {
        return Err(TPE::IncorrectFormat(
            "Minimal of 2 brackets not found!".to_owned(),
        ));
    }

    let mut tokens = token_positions.iter().peekable();
    let root_start = *tokens.next().unwrap();
    if tree_bytes[root_start] != TOKEN_START {
        return Err(TPE::IncorrectFormat(
            "Tree string must start with an opening bracket!".to_owned(),
        ));
    }
    let root_end = **tokens.peek().unwrap();

    let root_label = intern(&tree_bytes[(root_start + 1)..root_end], label_dict);
    let root = tree.new_node(root_label);
    let mut node_stack = vec![root];

    while let Some(token) = tokens.next() {
        match tree_bytes[*token] {
            TOKEN_START => {
                let Some(token_end) = tokens.peek() else {
                    let err_msg =
                        format!("Label has no ending token near col {token} , line \"{tree_str}\"");
                    return Err(TPE::IncorrectFormat(err_msg));
                };
                let label = intern(&tree_bytes[(*token + 1)..**token_end], label_dict);
                let n = tree.new_node(label);
                let Some(last_node) = node_stack.last() else {
                    let err_msg = format!("Reached unexpected end of token on line \"{tree_str}\"");
                    return Err(TPE::IncorrectFormat(err_msg));
                };
                last_node.append(n, &mut tree);
                node_stack.push(n);
            }
            TOKEN_END => {
                let Some(_) = node_stack.pop() else {
                    return Err(TPE::IncorrectFormat("Wrong bracket pairing".to_owned()));
                };
            }
            _ => return Err(TPE::TokenizerError),
        }
    }

    if !node_stack.is_empty() {
        return Err(TPE::IncorrectFormat(
            "Tree string has unclosed brackets!".to_owned(),
        ));
    }

    Ok(tree)
}

/// Parses a single tree, panicking on malformed input. Test convenience.
pub fn parse_single(tree_str: String, label_dict: &mut LabelDict) -> ParsedTree {
    parse_tree(Ok(tree_str), label_dict).expect("tree string must be valid bracket notation")
}

pub enum TreeOutput {
    BracketNotation,
    Graphviz,
}

/// Serializes a parsed tree back to text. Bracket output round-trips
/// through `parse_tree` byte for byte.
pub fn tree_to_string(tree: &ParsedTree, label_dict: &LabelDict, output: TreeOutput) -> String {
    let mut id_to_label = vec![""; label_dict.len()];
    for (label, (id, _)) in label_dict.iter() {
        id_to_label[*id as usize] = label.as_str();
    }

    let Some(root) = tree.iter().next() else {
        return String::new();
    };
    let root_id = tree.get_node_id(root).unwrap();

    match output {
        TreeOutput::BracketNotation => {
            let mut out = String::with_capacity(tree.count() * 4);
            write_bracket(root_id, tree, &id_to_label, &mut out);
            out
        }
        TreeOutput::Graphviz => {
            let mut out = String::from("digraph tree {\n");
            for nid in root_id.descendants(tree) {
                let label = id_to_label[*tree.get(nid).unwrap().get() as usize];
                out.push_str(&format!("  n{nid} [label=\"{label}\"];\n"));
                for cnid in nid.children(tree) {
                    out.push_str(&format!("  n{nid} -> n{cnid};\n"));
                }
            }
            out.push_str("}\n");
            out
        }
    }
}

fn write_bracket(nid: NodeId, tree: &ParsedTree, id_to_label: &[&str], out: &mut String) {
    out.push('{');
    out.push_str(id_to_label[*tree.get(nid).unwrap().get() as usize]);
    for cnid in nid.children(tree) {
        write_bracket(cnid, tree, id_to_label, out);
    }
    out.push('}');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses() {
        let input = "{einsteinstrasse{1}{3}}".to_owned();
        let mut ld = LabelDict::default();
        let arena = parse_tree(Ok(input), &mut ld);
        assert!(arena.is_ok());
        let arena = arena.unwrap();
        assert_eq!(arena.count(), 3);
        assert_eq!(ld.len(), 3);
        let labels: Vec<LabelId> = arena.iter().map(|node| *node.get()).collect();
        assert_eq!(labels, vec![0, 1, 2]);
    }

    #[test]
    fn test_repeated_labels_share_ids() {
        let input = "{a{b{a}}{b}}".to_owned();
        let mut ld = LabelDict::default();
        let arena = parse_tree(Ok(input), &mut ld).unwrap();
        assert_eq!(arena.count(), 4);
        assert_eq!(ld.len(), 2);
        assert_eq!(ld.get("a").unwrap().1, 2);
        assert_eq!(ld.get("b").unwrap().1, 2);
    }

    #[test]
    fn test_parses_escaped() {
        let input = String::from(
            r#"{article{key{journals/corr/abs-0812-2567}}{mdate{2017-06-07}}{publtype{informal}}{author{Jian Li}}{title{An O(log n / log log n\\}\\}) Upper Bound on the Price of Stability for Undirected Shapley Network Design Games}}{ee{http://arxiv.org/abs/0812.2567}}{year{2008}}{journal{CoRR}}{volume{abs/0812.2567}}{url{db/journals/corr/corr0812.html#abs-0812-2567}}}"#,
        );
        let mut ld = LabelDict::default();
        let arena = parse_tree(Ok(input), &mut ld);
        assert!(arena.is_ok());
        assert_eq!(arena.unwrap().count(), 21);
    }

    #[test]
    fn test_rejects_garbage() {
        let mut ld = LabelDict::default();
        assert!(parse_tree(Ok("".to_owned()), &mut ld).is_err());
        assert!(parse_tree(Ok("no brackets".to_owned()), &mut ld).is_err());
        assert!(parse_tree(Ok("}{".to_owned()), &mut ld).is_err());
        assert!(parse_tree(Ok("{a{b}".to_owned()), &mut ld).is_err());
    }

    #[test]
    fn test_other_bracket_families_are_label_bytes() {
        let mut ld = LabelDict::default();
        let arena = parse_tree(Ok("{f(x)[0]<y>{leaf}}".to_owned()), &mut ld).unwrap();
        assert_eq!(arena.count(), 2);
        assert!(ld.contains_key("f(x)[0]<y>"));
    }

    #[test]
    fn test_bracket_round_trip() {
        let inputs = [
            "{a}",
            "{a{b}{c}}",
            "{f{d{a}{c{b}}}{e}}",
            "{r{a}{b}{c}{d}}",
            "{x{}{y{}}}",
        ];
        for input in inputs {
            let mut ld = LabelDict::default();
            let tree = parse_single(input.to_owned(), &mut ld);
            assert_eq!(
                tree_to_string(&tree, &ld, TreeOutput::BracketNotation),
                input
            );
        }
    }

    #[test]
    fn test_descendants_correct() {
        let input = "{first{second{third}{fourth{fifth{six}{seven}}}}}".to_owned();
        let mut ld = LabelDict::default();
        let arena = parse_single(input, &mut ld);
        let root = arena.iter().next().unwrap();
        let root_id = arena.get_node_id(root).unwrap();
        let labels: Vec<LabelId> = root_id
            .descendants(&arena)
            .map(|nid| *arena.get(nid).unwrap().get())
            .collect();
        assert_eq!(labels, vec![0, 1, 2, 3, 4, 5, 6]);
    }
}
