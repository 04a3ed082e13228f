use super::Database;
use crate::error::StoreError;
use tracing::info;

/// Quotes an expression as a single FTS5 phrase.
pub fn fts_phrase(expression: &str) -> String {
    format!("\"{}\"", expression.replace('"', "\"\""))
}

impl Database {
    /// Ids of messages containing `expression`, newest first or by relevance.
    pub fn search(&self, expression: &str, ranked: bool) -> Result<Vec<i64>, StoreError> {
        let conn = self.conn()?;
        let order = if ranked { "rank" } else { "rowid DESC" };
        let sql = format!(
            "SELECT rowid FROM messageindex WHERE messageindex MATCH ?1 ORDER BY {}",
            order
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([fts_phrase(expression)], |row| row.get::<_, i64>(0))?;
        let mut ids = Vec::new();
        for id in rows {
            ids.push(id?);
        }
        Ok(ids)
    }

    /// Rebuilds the index from the message table.
    pub fn rebuild_index(&self) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute("INSERT INTO messageindex (messageindex) VALUES ('rebuild')", [])?;
        info!("Database: FTS index rebuilt");
        Ok(())
    }

    /// Merges the index b-trees.
    pub fn optimize_index(&self) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute("INSERT INTO messageindex (messageindex) VALUES ('optimize')", [])?;
        Ok(())
    }

    /// Index merge, planner statistics and file compaction.
    pub fn optimize_database(&self) -> Result<(), StoreError> {
        self.optimize_index()?;
        let conn = self.conn()?;
        conn.execute_batch("ANALYZE; VACUUM;")?;
        info!("Database: optimized");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::message;

    #[test]
    fn test_fts_phrase_quoting() {
        assert_eq!(fts_phrase("hello world"), "\"hello world\"");
        assert_eq!(fts_phrase("say \"hi\""), "\"say \"\"hi\"\"\"");
        // Operators lose their meaning inside a phrase
        assert_eq!(fts_phrase("a OR b"), "\"a OR b\"");
    }

    #[test]
    fn test_index_follows_writes() {
        let db = Database::open_in_memory().unwrap();
        db.insert_new(&message(1, 10, "a", "Le miel est prêt")).unwrap();
        db.insert_new(&message(2, 10, "b", "du miel de lavande")).unwrap();
        db.insert_new(&message(3, 10, "c", "rien à voir")).unwrap();

        // Trigram matching is case-insensitive and finds substrings
        assert_eq!(db.search("MIEL", false).unwrap(), vec![2, 1]);
        assert_eq!(db.search("lavan", false).unwrap(), vec![2]);

        let mut edited = message(3, 10, "c", "miel partout");
        db.upsert(&edited).unwrap();
        assert_eq!(db.search("miel", false).unwrap(), vec![3, 2, 1]);
        assert!(db.search("rien", false).unwrap().is_empty());

        edited.content = "plus rien".to_string();
        db.upsert(&edited).unwrap();
        db.delete_message(1).unwrap();
        assert_eq!(db.search("miel", false).unwrap(), vec![2]);
        assert_eq!(db.search("rien", false).unwrap(), vec![3]);
    }

    #[test]
    fn test_phrase_with_quotes_and_operators() {
        let db = Database::open_in_memory().unwrap();
        db.insert_new(&message(1, 10, "a", "il a dit \"bonjour\" hier")).unwrap();
        db.insert_new(&message(2, 10, "a", "cats OR dogs")).unwrap();
        db.insert_new(&message(3, 10, "a", "cats only")).unwrap();

        assert_eq!(db.search("\"bonjour\"", false).unwrap(), vec![1]);
        assert_eq!(db.search("cats OR dogs", false).unwrap(), vec![2]);
        assert_eq!(db.search("cats", true).unwrap().len(), 2);
    }

    #[test]
    fn test_rebuild_and_optimize() {
        let db = Database::open_in_memory().unwrap();
        for id in 1..=20 {
            db.insert_new(&message(id, 10, "a", &format!("message numéro {}", id)))
                .unwrap();
        }
        db.rebuild_index().unwrap();
        db.optimize_index().unwrap();
        db.optimize_database().unwrap();

        assert_eq!(db.search("numéro 1", false).unwrap().len(), 11);
        assert_eq!(db.search("numéro 20", false).unwrap(), vec![20]);
    }
}
