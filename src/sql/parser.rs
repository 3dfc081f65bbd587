//! SQL Parser
//!
//! Recursive-descent parser turning tokens into a [`Statement`]. WHERE
//! clauses are a flat list of `column <predicate>` terms joined by AND;
//! OR and parenthesised conditions are rejected.

use super::ast::*;
use super::lexer::Lexer;
use super::token::{Spanned, Token};
use crate::catalog::DataType;
use crate::error::{Error, Result};
use crate::storage::Value;

/// SQL Parser
pub struct Parser {
    tokens: Vec<Spanned>,
    position: usize,
}

impl Parser {
    /// Create a new parser from a SQL string
    pub fn new(sql: &str) -> Result<Self> {
        let mut lexer = Lexer::new(sql);
        let tokens = lexer.tokenize()?;

        Ok(Self {
            tokens,
            position: 0,
        })
    }

    /// Parse exactly one statement with an optional trailing semicolon
    pub fn parse(&mut self) -> Result<Statement> {
        let stmt = self.parse_statement()?;

        if self.check(&Token::Semicolon) {
            self.advance();
        }
        if !self.is_at_end() {
            return Err(self.unexpected("end of statement"));
        }

        Ok(stmt)
    }

    /// Parse a single statement
    fn parse_statement(&mut self) -> Result<Statement> {
        match self.current() {
            Token::Select => self.parse_select().map(Statement::Select),
            Token::Insert => self.parse_insert().map(Statement::Insert),
            Token::Update => self.parse_update().map(Statement::Update),
            Token::Delete => self.parse_delete().map(Statement::Delete),
            Token::Create => self.parse_create(),
            Token::Drop => self.parse_drop(),
            Token::Begin => self.parse_transaction_keyword(&Token::Begin, Statement::Begin),
            Token::Commit => self.parse_transaction_keyword(&Token::Commit, Statement::Commit),
            Token::Rollback => {
                self.parse_transaction_keyword(&Token::Rollback, Statement::Rollback)
            }
            _ => Err(self.unexpected(
                "SELECT, INSERT, UPDATE, DELETE, CREATE, DROP, BEGIN, COMMIT, or ROLLBACK",
            )),
        }
    }

    // ========== SELECT Statement ==========

    fn parse_select(&mut self) -> Result<SelectStatement> {
        self.expect(&Token::Select)?;

        let projection = if self.check(&Token::Asterisk) {
            self.advance();
            Projection::All
        } else {
            let mut columns = vec![self.parse_column_ref()?];
            while self.check(&Token::Comma) {
                self.advance();
                columns.push(self.parse_column_ref()?);
            }
            Projection::Columns(columns)
        };

        self.expect(&Token::From)?;
        let from = self.parse_table_ref()?;

        let mut joins = Vec::new();
        while self.is_join_keyword() {
            joins.push(self.parse_join()?);
        }

        let conditions = self.parse_where()?;

        let mut order_by = Vec::new();
        if self.check(&Token::Order) {
            self.advance();
            self.expect(&Token::By)?;
            order_by = self.parse_order_by_list()?;
        }

        let mut limit = None;
        let mut offset = None;
        if self.check(&Token::Limit) {
            self.advance();
            limit = Some(self.expect_count("LIMIT")?);
        }
        if self.check(&Token::Offset) {
            self.advance();
            offset = Some(self.expect_count("OFFSET")?);
        }

        Ok(SelectStatement {
            projection,
            from,
            joins,
            conditions,
            order_by,
            limit,
            offset,
        })
    }

    fn parse_table_ref(&mut self) -> Result<TableRef> {
        let name = self.expect_identifier()?;

        let alias = if self.check(&Token::As) {
            self.advance();
            Some(self.expect_identifier()?)
        } else if let Token::Identifier(alias) = self.current().clone() {
            self.advance();
            Some(alias)
        } else {
            None
        };

        Ok(TableRef { name, alias })
    }

    fn is_join_keyword(&self) -> bool {
        matches!(self.current(), Token::Join | Token::Inner | Token::Left)
    }

    fn parse_join(&mut self) -> Result<Join> {
        let join_type = if self.check(&Token::Left) {
            self.advance();
            if self.check(&Token::Outer) {
                self.advance();
            }
            JoinType::Left
        } else {
            if self.check(&Token::Inner) {
                self.advance();
            }
            JoinType::Inner
        };
        self.expect(&Token::Join)?;
        let table = self.parse_table_ref()?;

        self.expect(&Token::On)?;
        let left = self.parse_column_ref()?;
        self.expect(&Token::Eq)?;
        let right = self.parse_column_ref()?;

        Ok(Join {
            join_type,
            table,
            left,
            right,
        })
    }

    fn parse_order_by_list(&mut self) -> Result<Vec<OrderByItem>> {
        let mut items = Vec::new();

        loop {
            let column = self.parse_column_ref()?;
            let ascending = if self.check(&Token::Desc) {
                self.advance();
                false
            } else {
                if self.check(&Token::Asc) {
                    self.advance();
                }
                true
            };

            items.push(OrderByItem { column, ascending });

            if !self.check(&Token::Comma) {
                break;
            }
            self.advance();
        }

        Ok(items)
    }

    // ========== WHERE Clause ==========

    fn parse_where(&mut self) -> Result<Vec<Condition>> {
        let mut conditions = Vec::new();
        if !self.check(&Token::Where) {
            return Ok(conditions);
        }
        self.advance();

        loop {
            conditions.push(self.parse_condition()?);

            if self.check(&Token::And) {
                self.advance();
                continue;
            }
            if self.check(&Token::Or) {
                return Err(Error::ParseError(format!(
                    "OR is not supported at position {}; combine conditions with AND",
                    self.current_offset()
                )));
            }
            break;
        }

        Ok(conditions)
    }

    fn parse_condition(&mut self) -> Result<Condition> {
        if self.check(&Token::LParen) {
            return Err(Error::ParseError(format!(
                "parenthesised conditions are not supported at position {}",
                self.current_offset()
            )));
        }

        let column = self.parse_column_ref()?;

        let predicate = match self.current().clone() {
            Token::Eq => self.parse_comparison(CompareOp::Eq)?,
            Token::Neq => self.parse_comparison(CompareOp::NotEq)?,
            Token::Lt => self.parse_comparison(CompareOp::Lt)?,
            Token::Lte => self.parse_comparison(CompareOp::LtEq)?,
            Token::Gt => self.parse_comparison(CompareOp::Gt)?,
            Token::Gte => self.parse_comparison(CompareOp::GtEq)?,
            Token::Like => {
                self.advance();
                match self.current().clone() {
                    Token::StringLiteral(pattern) => {
                        self.advance();
                        Predicate::Like(pattern)
                    }
                    _ => return Err(self.unexpected("quoted LIKE pattern")),
                }
            }
            Token::In => {
                self.advance();
                self.expect(&Token::LParen)?;
                let values = self.parse_literal_list()?;
                self.expect(&Token::RParen)?;
                Predicate::In(values)
            }
            Token::Is => {
                self.advance();
                if self.check(&Token::Not) {
                    self.advance();
                    self.expect(&Token::Null)?;
                    Predicate::IsNotNull
                } else {
                    self.expect(&Token::Null)?;
                    Predicate::IsNull
                }
            }
            _ => {
                return Err(self.unexpected(
                    "comparison operator, LIKE, IN, IS NULL or IS NOT NULL",
                ))
            }
        };

        Ok(Condition { column, predicate })
    }

    fn parse_comparison(&mut self, op: CompareOp) -> Result<Predicate> {
        self.advance();
        let value = self.parse_literal()?;
        Ok(Predicate::Compare(op, value))
    }

    // ========== INSERT Statement ==========

    fn parse_insert(&mut self) -> Result<InsertStatement> {
        self.expect(&Token::Insert)?;
        self.expect(&Token::Into)?;

        let table_name = self.expect_identifier()?;

        // Optional column list
        let columns = if self.check(&Token::LParen) {
            self.advance();
            let cols = self.parse_identifier_list()?;
            self.expect(&Token::RParen)?;
            Some(cols)
        } else {
            None
        };

        self.expect(&Token::Values)?;

        let mut rows = Vec::new();
        loop {
            self.expect(&Token::LParen)?;
            let row = self.parse_literal_list()?;
            self.expect(&Token::RParen)?;
            rows.push(row);

            if !self.check(&Token::Comma) {
                break;
            }
            self.advance();
        }

        Ok(InsertStatement {
            table_name,
            columns,
            rows,
        })
    }

    // ========== UPDATE Statement ==========

    fn parse_update(&mut self) -> Result<UpdateStatement> {
        self.expect(&Token::Update)?;

        let table_name = self.expect_identifier()?;

        self.expect(&Token::Set)?;

        let mut assignments = Vec::new();
        loop {
            let column = self.expect_identifier()?;
            self.expect(&Token::Eq)?;
            let value = self.parse_literal()?;
            assignments.push(Assignment { column, value });

            if !self.check(&Token::Comma) {
                break;
            }
            self.advance();
        }

        let conditions = self.parse_where()?;

        Ok(UpdateStatement {
            table_name,
            assignments,
            conditions,
        })
    }

    // ========== DELETE Statement ==========

    fn parse_delete(&mut self) -> Result<DeleteStatement> {
        self.expect(&Token::Delete)?;
        self.expect(&Token::From)?;

        let table_name = self.expect_identifier()?;
        let conditions = self.parse_where()?;

        Ok(DeleteStatement {
            table_name,
            conditions,
        })
    }

    // ========== CREATE Statement ==========

    fn parse_create(&mut self) -> Result<Statement> {
        self.expect(&Token::Create)?;

        match self.current() {
            Token::Table => self.parse_create_table().map(Statement::CreateTable),
            Token::Index | Token::Unique => self.parse_create_index().map(Statement::CreateIndex),
            _ => Err(self.unexpected("TABLE or INDEX")),
        }
    }

    fn parse_if_not_exists(&mut self) -> Result<bool> {
        if !self.check(&Token::If) {
            return Ok(false);
        }
        self.advance();
        self.expect(&Token::Not)?;
        self.expect(&Token::Exists)?;
        Ok(true)
    }

    fn parse_if_exists(&mut self) -> Result<bool> {
        if !self.check(&Token::If) {
            return Ok(false);
        }
        self.advance();
        self.expect(&Token::Exists)?;
        Ok(true)
    }

    fn parse_create_table(&mut self) -> Result<CreateTableStatement> {
        self.expect(&Token::Table)?;

        let if_not_exists = self.parse_if_not_exists()?;
        let table_name = self.expect_identifier()?;

        self.expect(&Token::LParen)?;

        let mut columns = Vec::new();
        loop {
            columns.push(self.parse_column_def()?);

            if !self.check(&Token::Comma) {
                break;
            }
            self.advance();
        }

        self.expect(&Token::RParen)?;

        Ok(CreateTableStatement {
            table_name,
            columns,
            if_not_exists,
        })
    }

    fn parse_create_index(&mut self) -> Result<CreateIndexStatement> {
        let unique = if self.check(&Token::Unique) {
            self.advance();
            true
        } else {
            false
        };

        self.expect(&Token::Index)?;

        let if_not_exists = self.parse_if_not_exists()?;
        let index_name = self.expect_identifier()?;
        self.expect(&Token::On)?;
        let table_name = self.expect_identifier()?;

        self.expect(&Token::LParen)?;
        let column = self.expect_identifier()?;
        if self.check(&Token::Comma) {
            return Err(Error::ParseError(format!(
                "composite indexes are not supported at position {}",
                self.current_offset()
            )));
        }
        self.expect(&Token::RParen)?;

        Ok(CreateIndexStatement {
            index_name,
            table_name,
            column,
            unique,
            if_not_exists,
        })
    }

    fn parse_column_def(&mut self) -> Result<ColumnDef> {
        let name = self.expect_identifier()?;
        let data_type = self.parse_data_type()?;

        let mut not_null = false;
        let mut default = None;
        let mut primary_key = false;
        let mut unique = false;

        // Parse column constraints
        loop {
            if self.check(&Token::Not) {
                self.advance();
                self.expect(&Token::Null)?;
                not_null = true;
            } else if self.check(&Token::Null) {
                self.advance();
                // NULL is allowed (default)
            } else if self.check(&Token::Default) {
                self.advance();
                default = Some(self.parse_literal()?);
            } else if self.check(&Token::Primary) {
                self.advance();
                self.expect(&Token::Key)?;
                primary_key = true;
                not_null = true;
            } else if self.check(&Token::Unique) {
                self.advance();
                unique = true;
            } else {
                break;
            }
        }

        Ok(ColumnDef {
            name,
            data_type,
            primary_key,
            unique,
            not_null,
            default,
        })
    }

    fn parse_data_type(&mut self) -> Result<DataType> {
        let dt = match self.current() {
            Token::Int | Token::Integer => {
                self.advance();
                DataType::Integer
            }
            Token::Float => {
                self.advance();
                DataType::Float
            }
            Token::Varchar => {
                self.advance();
                self.expect(&Token::LParen)?;
                let len = self.expect_count("VARCHAR length")?;
                self.expect(&Token::RParen)?;
                DataType::Varchar(len)
            }
            Token::Text => {
                self.advance();
                DataType::Text
            }
            Token::Boolean => {
                self.advance();
                DataType::Boolean
            }
            Token::Date => {
                self.advance();
                DataType::Date
            }
            _ => return Err(self.unexpected("data type")),
        };

        Ok(dt)
    }

    // ========== DROP Statement ==========

    fn parse_drop(&mut self) -> Result<Statement> {
        self.expect(&Token::Drop)?;

        match self.current() {
            Token::Table => {
                self.advance();
                let if_exists = self.parse_if_exists()?;
                let table_name = self.expect_identifier()?;

                Ok(Statement::DropTable(DropTableStatement {
                    table_name,
                    if_exists,
                }))
            }
            Token::Index => {
                self.advance();
                let if_exists = self.parse_if_exists()?;
                let index_name = self.expect_identifier()?;
                let table_name = if self.check(&Token::On) {
                    self.advance();
                    Some(self.expect_identifier()?)
                } else {
                    None
                };

                Ok(Statement::DropIndex(DropIndexStatement {
                    index_name,
                    table_name,
                    if_exists,
                }))
            }
            _ => Err(self.unexpected("TABLE or INDEX")),
        }
    }

    // ========== Transaction Statements ==========

    fn parse_transaction_keyword(&mut self, keyword: &Token, stmt: Statement) -> Result<Statement> {
        self.expect(keyword)?;
        if self.check(&Token::Transaction) {
            self.advance();
        }
        Ok(stmt)
    }

    // ========== Literals and Names ==========

    fn parse_literal(&mut self) -> Result<Value> {
        let value = match self.current().clone() {
            Token::IntegerLiteral(n) => Value::Integer(n),
            Token::FloatLiteral(n) => Value::Float(n),
            Token::StringLiteral(s) => Value::Text(s),
            Token::True => Value::Boolean(true),
            Token::False => Value::Boolean(false),
            Token::Null => Value::Null,
            _ => return Err(self.unexpected("literal value")),
        };
        self.advance();
        Ok(value)
    }

    fn parse_literal_list(&mut self) -> Result<Vec<Value>> {
        let mut values = vec![self.parse_literal()?];
        while self.check(&Token::Comma) {
            self.advance();
            values.push(self.parse_literal()?);
        }
        Ok(values)
    }

    fn parse_column_ref(&mut self) -> Result<ColumnRef> {
        let first = self.expect_identifier()?;
        if self.check(&Token::Dot) {
            self.advance();
            let column = self.expect_identifier()?;
            return Ok(ColumnRef::qualified(first, column));
        }
        Ok(ColumnRef::new(first))
    }

    fn parse_identifier_list(&mut self) -> Result<Vec<String>> {
        let mut identifiers = vec![self.expect_identifier()?];
        while self.check(&Token::Comma) {
            self.advance();
            identifiers.push(self.expect_identifier()?);
        }
        Ok(identifiers)
    }

    // ========== Token Helpers ==========

    fn current(&self) -> &Token {
        static EOF: Token = Token::Eof;
        self.tokens
            .get(self.position)
            .map(|s| &s.token)
            .unwrap_or(&EOF)
    }

    fn current_offset(&self) -> usize {
        self.tokens
            .get(self.position)
            .or_else(|| self.tokens.last())
            .map(|s| s.offset)
            .unwrap_or(0)
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() {
            self.position += 1;
        }
    }

    fn is_at_end(&self) -> bool {
        matches!(self.current(), Token::Eof)
    }

    fn check(&self, token: &Token) -> bool {
        std::mem::discriminant(self.current()) == std::mem::discriminant(token)
    }

    fn unexpected(&self, expected: &str) -> Error {
        if self.is_at_end() {
            Error::UnexpectedEof {
                expected: expected.to_string(),
                position: self.current_offset(),
            }
        } else {
            Error::UnexpectedToken {
                expected: expected.to_string(),
                found: self.current().to_string(),
                position: self.current_offset(),
            }
        }
    }

    fn expect(&mut self, token: &Token) -> Result<()> {
        if self.check(token) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(&token.to_string()))
        }
    }

    fn expect_identifier(&mut self) -> Result<String> {
        let name = match self.current() {
            Token::Identifier(name) => name.clone(),
            other => match other.as_unreserved_name() {
                Some(name) => name.to_string(),
                None => return Err(self.unexpected("identifier")),
            },
        };
        self.advance();
        Ok(name)
    }

    fn expect_count(&mut self, what: &str) -> Result<usize> {
        match self.current().clone() {
            Token::IntegerLiteral(n) if n >= 0 => {
                self.advance();
                Ok(n as usize)
            }
            _ => Err(self.unexpected(&format!("non-negative integer for {}", what))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(sql: &str) -> Statement {
        Parser::new(sql).unwrap().parse().unwrap()
    }

    fn parse_err(sql: &str) -> Error {
        match Parser::new(sql) {
            Ok(mut p) => p.parse().unwrap_err(),
            Err(e) => e,
        }
    }

    #[test]
    fn test_parse_simple_select() {
        match parse("SELECT * FROM users;") {
            Statement::Select(s) => {
                assert_eq!(s.projection, Projection::All);
                assert_eq!(s.from.name, "users");
                assert!(s.conditions.is_empty());
            }
            _ => panic!("Expected SELECT statement"),
        }
    }

    #[test]
    fn test_parse_select_with_clauses() {
        let stmt = parse(
            "SELECT name, age FROM users WHERE age >= 18 AND name LIKE 'A%' \
             ORDER BY age DESC, name LIMIT 10 OFFSET 5",
        );
        match stmt {
            Statement::Select(s) => {
                assert_eq!(
                    s.projection,
                    Projection::Columns(vec![ColumnRef::new("name"), ColumnRef::new("age")])
                );
                assert_eq!(s.conditions.len(), 2);
                assert_eq!(
                    s.conditions[0].predicate,
                    Predicate::Compare(CompareOp::GtEq, Value::Integer(18))
                );
                assert_eq!(s.conditions[1].predicate, Predicate::Like("A%".to_string()));
                assert_eq!(s.order_by.len(), 2);
                assert!(!s.order_by[0].ascending);
                assert!(s.order_by[1].ascending);
                assert_eq!(s.limit, Some(10));
                assert_eq!(s.offset, Some(5));
            }
            _ => panic!("Expected SELECT statement"),
        }
    }

    #[test]
    fn test_parse_in_and_null_predicates() {
        match parse("SELECT * FROM t WHERE a IN (1, 2.5, 'x') AND b IS NOT NULL AND c IS NULL") {
            Statement::Select(s) => {
                assert_eq!(
                    s.conditions[0].predicate,
                    Predicate::In(vec![Value::Integer(1), Value::Float(2.5), Value::from("x")])
                );
                assert_eq!(s.conditions[1].predicate, Predicate::IsNotNull);
                assert_eq!(s.conditions[2].predicate, Predicate::IsNull);
            }
            _ => panic!("Expected SELECT statement"),
        }
    }

    #[test]
    fn test_parse_join() {
        let stmt = parse(
            "SELECT u.name, o.total FROM users u LEFT JOIN orders AS o ON u.id = o.user_id",
        );
        match stmt {
            Statement::Select(s) => {
                assert_eq!(s.from.reference_name(), "u");
                assert_eq!(s.joins.len(), 1);
                assert_eq!(s.joins[0].join_type, JoinType::Left);
                assert_eq!(s.joins[0].table.reference_name(), "o");
                assert_eq!(s.joins[0].left, ColumnRef::qualified("u", "id"));
                assert_eq!(s.joins[0].right, ColumnRef::qualified("o", "user_id"));
            }
            _ => panic!("Expected SELECT statement"),
        }
    }

    #[test]
    fn test_parse_create_table() {
        let stmt = parse(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, email VARCHAR(255) UNIQUE NOT NULL, \
             active BOOLEAN DEFAULT TRUE, date DATE)",
        );
        match stmt {
            Statement::CreateTable(s) => {
                assert_eq!(s.table_name, "users");
                assert_eq!(s.columns.len(), 4);
                assert!(s.columns[0].primary_key);
                assert!(s.columns[0].not_null);
                assert_eq!(s.columns[1].data_type, DataType::Varchar(255));
                assert!(s.columns[1].unique && s.columns[1].not_null);
                assert_eq!(s.columns[2].default, Some(Value::Boolean(true)));
                assert_eq!(s.columns[3].name, "date");
            }
            _ => panic!("Expected CREATE TABLE statement"),
        }
    }

    #[test]
    fn test_parse_indexes() {
        match parse("CREATE UNIQUE INDEX idx_email ON users (email)") {
            Statement::CreateIndex(s) => {
                assert!(s.unique);
                assert_eq!(s.column, "email");
            }
            _ => panic!("Expected CREATE INDEX statement"),
        }
        match parse("DROP INDEX idx_email ON users") {
            Statement::DropIndex(s) => {
                assert_eq!(s.index_name, "idx_email");
                assert_eq!(s.table_name.as_deref(), Some("users"));
            }
            _ => panic!("Expected DROP INDEX statement"),
        }
    }

    #[test]
    fn test_parse_insert() {
        match parse("INSERT INTO users (id, name) VALUES (1, 'Alice'), (2, NULL)") {
            Statement::Insert(s) => {
                assert_eq!(s.table_name, "users");
                assert_eq!(s.columns, Some(vec!["id".to_string(), "name".to_string()]));
                assert_eq!(s.rows.len(), 2);
                assert_eq!(s.rows[1][1], Value::Null);
            }
            _ => panic!("Expected INSERT statement"),
        }
    }

    #[test]
    fn test_parse_update_and_delete() {
        match parse("UPDATE users SET name = 'Bob', age = -3 WHERE id = 1") {
            Statement::Update(s) => {
                assert_eq!(s.assignments.len(), 2);
                assert_eq!(s.assignments[1].value, Value::Integer(-3));
                assert_eq!(s.conditions.len(), 1);
            }
            _ => panic!("Expected UPDATE statement"),
        }
        match parse("DELETE FROM users") {
            Statement::Delete(s) => assert!(s.conditions.is_empty()),
            _ => panic!("Expected DELETE statement"),
        }
    }

    #[test]
    fn test_parse_transactions() {
        assert_eq!(parse("BEGIN"), Statement::Begin);
        assert_eq!(parse("begin transaction;"), Statement::Begin);
        assert_eq!(parse("COMMIT"), Statement::Commit);
        assert_eq!(parse("ROLLBACK TRANSACTION"), Statement::Rollback);
    }

    #[test]
    fn test_or_rejected() {
        let err = parse_err("SELECT * FROM t WHERE a = 1 OR b = 2");
        assert!(matches!(err, Error::ParseError(msg) if msg.contains("OR")));
    }

    #[test]
    fn test_error_positions() {
        let err = parse_err("SELECT * FORM users");
        assert!(matches!(
            err,
            Error::UnexpectedToken { position: 9, ref found, .. } if found == "FORM"
        ));

        let err = parse_err("INSERT INTO users VALUES (1,");
        assert!(matches!(err, Error::UnexpectedEof { position: 28, .. }));

        let err = parse_err("SELECT * FROM t extra junk");
        assert!(matches!(err, Error::UnexpectedToken { .. }));
    }
}
