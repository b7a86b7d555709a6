use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct CliArgs {
    /// コイン設定ファイル (coins.config.json) へのパス
    #[clap(short, long, value_parser, default_value = "coins.config.json")]
    pub config: PathBuf,

    /// 各コインのノードを束ねるゲートウェイサーバーのベースURL
    #[clap(short, long, value_parser)]
    pub server: Option<String>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 対応コインの一覧を表示
    Coins {
        /// ローカル設定ではなくサーバーに問い合わせる
        #[clap(long)]
        remote: bool,
    },

    /// 12単語の新しいシードを生成
    NewSeed,

    /// シードからアドレスと鍵ペアを導出
    Addresses {
        #[clap(long, value_parser)]
        coin: String,
        /// シード文字列 (--last-seed 指定時は以前の lastseed の16進数)
        #[clap(long, value_parser)]
        seed: String,
        /// --seed を以前の出力の lastseed として扱い、鍵の列を続ける
        #[clap(long)]
        last_seed: bool,
        #[clap(long, value_parser, default_value_t = 1)]
        qty: usize,
    },

    /// カンマ区切りアドレスの残高 (ノードの報告どおり)
    Balance {
        #[clap(long, value_parser)]
        coin: String,
        #[clap(long, value_parser)]
        addrs: String,
    },

    /// カンマ区切りアドレスの未使用出力とその合計
    Outputs {
        #[clap(long, value_parser)]
        coin: String,
        #[clap(long, value_parser)]
        addrs: String,
    },

    /// ノードが報告するトランザクションを表示
    Transaction {
        #[clap(long, value_parser)]
        coin: String,
        #[clap(long, value_parser)]
        txid: String,
    },

    /// JSON記述からオフラインでトランザクションを構築・署名
    Build {
        /// コイン種別、出力、鍵、送金先、金額を記述したJSONファイルへのパス
        #[clap(short, long, value_parser)]
        input_file: PathBuf,

        /// 生成されたraw transaction hexを保存するファイルへのパス
        #[clap(short, long, value_parser)]
        output_file: PathBuf,
    },

    /// トランザクションを構築・署名してノードに送信
    Send {
        #[clap(long, value_parser)]
        coin: String,
        /// カンマ区切りの入力アドレス
        #[clap(long, value_parser)]
        addrs: String,
        /// カンマ区切りの秘密鍵 (アドレスと同じ順序)
        #[clap(long, value_parser)]
        keys: String,
        #[clap(long, value_parser)]
        to: String,
        #[clap(long, value_parser)]
        amount: String,
    },

    /// raw transactionをデコード
    Decode {
        #[clap(long, value_parser)]
        coin: String,
        #[clap(long, value_parser)]
        rawtx: String,
    },

    /// バージョンを表示
    Version,
}
