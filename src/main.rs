use anyhow::{bail, Context, Result};
use btree_file_engine::{BTree, NodeTag};
use env_logger::Env;

// Driver program exercising the library's top level api's.
fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("debug")).init();

    let args = std::env::args().collect::<Vec<_>>();
    match args.len() {
        0 | 1 => bail!("Missing <database path> and <command>"),
        2 => bail!("Missing <command>"),
        _ => {}
    }

    let path = &args[1];
    let mut tree = BTree::open(path).with_context(|| format!("opening {path}"))?;

    let command = &args[2];
    match command.as_str() {
        "create" => {
            let variant = args.get(3).map(String::as_str).unwrap_or("table");
            let tag = match variant {
                "table" => NodeTag::TableLeaf,
                "index" => NodeTag::IndexLeaf,
                other => bail!("Unknown node variant: {other}"),
            };
            let root = tree.new_node(tag)?;
            println!("{root}");
        }
        "insert-table" => {
            let root: u32 = args[3].parse().context("<root> must be a page number")?;
            let key: u32 = args[4].parse().context("<key> must be an integer")?;
            let payload = args[5].clone().into_bytes();
            tree.insert_in_table(root, key, payload)?;
        }
        "insert-index" => {
            let root: u32 = args[3].parse().context("<root> must be a page number")?;
            let key_idx: u32 = args[4].parse().context("<key-idx> must be an integer")?;
            let key_pk: u32 = args[5].parse().context("<key-pk> must be an integer")?;
            tree.insert_in_index(root, key_idx, key_pk)?;
        }
        "find-table" => {
            let root: u32 = args[3].parse().context("<root> must be a page number")?;
            let key: u32 = args[4].parse().context("<key> must be an integer")?;
            let payload = tree.find_in_table(root, key)?;
            println!("{}", String::from_utf8_lossy(&payload));
        }
        "find-index" => {
            let index_root: u32 = args[3].parse().context("<index-root> must be a page number")?;
            let table_root: u32 = args[4].parse().context("<table-root> must be a page number")?;
            let key_idx: u32 = args[5].parse().context("<key-idx> must be an integer")?;
            let payload = tree.find_in_index(index_root, table_root, key_idx)?;
            println!("{}", String::from_utf8_lossy(&payload));
        }
        "dump" => {
            let root: u32 = args[3].parse().context("<root> must be a page number")?;
            let rows = tree.scan_table(root)?;
            println!("{} rows in table rooted at page {root}:", rows.len());
            for (key, payload) in rows {
                println!("{key}: {}", String::from_utf8_lossy(&payload));
            }
        }
        _ => bail!("Unknown command: {command}"),
    }

    tree.close()?;
    Ok(())
}
