use serde::{Deserialize, Serialize};
use super::data_type::DataType;
use crate::parser::Ident;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub primary_key: bool,
}

/// Schema of a logical table; every shard table is created from it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    pub fn new(table: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        Self { table: table.into(), columns }
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// `CREATE TABLE IF NOT EXISTS` for one physical shard of this table.
    pub fn create_table_sql(&self, physical_table: &str) -> String {
        let mut defs: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let mut def = format!("{} {}", Ident::new(c.name.as_str()), c.data_type);
                if !c.nullable && !c.primary_key {
                    def.push_str(" NOT NULL");
                }
                def
            })
            .collect();

        let pk: Vec<String> = self
            .columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| Ident::new(c.name.as_str()).to_string())
            .collect();
        if !pk.is_empty() {
            defs.push(format!("PRIMARY KEY ({})", pk.join(", ")));
        }

        format!("CREATE TABLE IF NOT EXISTS {} ({})", Ident::new(physical_table), defs.join(", "))
    }
}
