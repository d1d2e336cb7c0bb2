use crate::output::{print_json, print_table};
use ssr_core::symbols::SymbolTable;

pub fn run(json: bool) -> anyhow::Result<()> {
    let table = SymbolTable::builtin();

    if json {
        let entries: Vec<serde_json::Value> = table
            .iter()
            .map(|(symbol, label)| serde_json::json!({ "symbol": symbol, "label": label }))
            .collect();
        print_json(&entries)?;
        return Ok(());
    }

    let rows = table
        .iter()
        .map(|(symbol, label)| vec![symbol.to_string(), label.to_string()])
        .collect();
    print_table(&["SYMBOL", "LABEL"], rows);
    Ok(())
}
