//! Prompt Module
//!
//! 対話的なファイル選択と確認を行うモジュール。
//! 入出力を`BufRead` / `Write`として注入するため、端末なしでテストできます。

use std::io::{BufRead, Write};
use std::path::Path;

use crate::error::XlsmConvError;
use crate::lister::SourceFile;

const RULE_WIDTH: usize = 50;

/// ファイル選択の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// 0始まりのインデックス
    File(usize),
    /// 利用者が終了を選んだ（または入力が終了した）
    Quit,
}

/// 対話入出力
///
/// # 使用例
///
/// ```rust
/// use std::io::Cursor;
/// use xlsmconv::Prompter;
///
/// let mut prompter = Prompter::new(Cursor::new("y\n"), Vec::new());
/// assert!(prompter.confirm("Proceed with conversion?").unwrap());
/// ```
#[derive(Debug)]
pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// 出力先への参照
    pub fn output(&mut self) -> &mut W {
        &mut self.output
    }

    pub fn into_inner(self) -> (R, W) {
        (self.input, self.output)
    }

    /// プロンプトを表示して1行読み込む。入力が終了していれば`None`
    fn ask(&mut self, prompt: &str) -> Result<Option<String>, XlsmConvError> {
        write!(self.output, "{}", prompt)?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            writeln!(self.output)?;
            return Ok(None);
        }
        Ok(Some(line.trim().to_lowercase()))
    }

    /// 番号付きのファイル一覧を表示する
    pub fn show_menu(&mut self, dir: &Path, files: &[SourceFile]) -> Result<(), XlsmConvError> {
        writeln!(
            self.output,
            "\nFound {} XLSM file(s) in '{}':",
            files.len(),
            dir.display()
        )?;
        writeln!(self.output, "{}", "-".repeat(RULE_WIDTH))?;
        for (i, file) in files.iter().enumerate() {
            writeln!(self.output, "{:2}. {}", i + 1, file.name())?;
            writeln!(
                self.output,
                "     Size: {:.1} KB, Modified: {}",
                file.size as f64 / 1024.0,
                file.modified.format("%Y-%m-%d %H:%M")
            )?;
        }
        writeln!(self.output, "{}", "-".repeat(RULE_WIDTH))?;
        Ok(())
    }

    /// 1始まりの番号でファイルを選択させる
    ///
    /// 無効な入力の場合は再入力を求めます。`q`または入力の終了で`Selection::Quit`。
    pub fn select(&mut self, count: usize) -> Result<Selection, XlsmConvError> {
        let prompt = format!("Select file (1-{}) or 'q' to quit: ", count);
        loop {
            let Some(answer) = self.ask(&prompt)? else {
                return Ok(Selection::Quit);
            };
            if answer == "q" {
                return Ok(Selection::Quit);
            }
            match answer.parse::<usize>() {
                Ok(n) if (1..=count).contains(&n) => return Ok(Selection::File(n - 1)),
                Ok(_) => writeln!(self.output, "Please enter a number between 1 and {}", count)?,
                Err(_) => writeln!(self.output, "Please enter a valid number or 'q' to quit")?,
            }
        }
    }

    /// `(y/N)`形式で確認する。`y` / `yes`のみ肯定、空入力は否定
    pub fn confirm(&mut self, question: &str) -> Result<bool, XlsmConvError> {
        let answer = self.ask(&format!("{} (y/N): ", question))?;
        Ok(matches!(answer.as_deref(), Some("y") | Some("yes")))
    }

    /// Enterが押されるまで待つ
    pub fn pause(&mut self) -> Result<(), XlsmConvError> {
        self.ask("\nPress Enter to exit...")?;
        Ok(())
    }
}
