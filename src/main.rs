use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use bitcoin::Transaction;
use bitcoin::consensus::encode;
use clap::Parser;
use serde::Serialize;

use coin_gateway_signer::amount::{format_amount, parse_amount};
use coin_gateway_signer::config::BuildInput;
use coin_gateway_signer::keys::{self, Seed};
use coin_gateway_signer::skycoin::SkyTransaction;
use coin_gateway_signer::{
    AddressKeySet, Balance, CoinFamily, CoinMeta, CoinRegistry, Engine, GatewayConfig, GatewayError,
    HttpNode, OutputId, OutputSource, Result, SendRequest, UnspentOutput, VERSION,
};

mod cli;

use cli::{CliArgs, Command};

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn split_addresses(addrs: &str) -> Vec<String> {
    addrs
        .split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect()
}

/// Signs the spend described in `input_file` without touching the network.
fn build_offline(engine: &Engine<'_>, input_file: &Path, output_file: &Path) -> Result<()> {
    let input_file_content = fs::read_to_string(input_file).map_err(|e| {
        log::error!("入力ファイルの読み込みに失敗しました: {:?}", input_file);
        GatewayError::Io(e)
    })?;
    let input: BuildInput = serde_json::from_str(&input_file_content).map_err(|e| {
        log::error!("入力JSONのパースに失敗しました: {:?}", input_file);
        GatewayError::Json(e)
    })?;

    log::debug!("入力ファイルのパース成功: coin={}, outputs={}", input.coin_type, input.outputs.len());

    let coin = engine.coin(&input.coin_type)?;
    let decimals = coin.family().decimals();
    let outputs = input
        .outputs
        .into_iter()
        .map(|record| -> Result<UnspentOutput> {
            Ok(UnspentOutput {
                coins: parse_amount(&record.coins, decimals, decimals)?,
                id: OutputId {
                    hash: record.hash,
                    index: record.index,
                },
                address: record.address,
                hours: record.hours,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let keys = AddressKeySet::from_csv(&input.addresses, &input.private_keys)?;
    let amount = engine.parse_amount(coin, &input.amount)?;
    engine.validate_address(coin, &input.destination)?;

    let raw = engine.assemble(coin, outputs, &keys, &input.destination, amount)?;
    log::info!("署名済みトランザクションの生成に成功しました。txid={}", raw.txid);
    println!("{}", raw.hex);

    let mut output = File::create(output_file).map_err(|e| {
        log::error!("出力ファイルの作成に失敗しました: {:?}", output_file);
        GatewayError::Io(e)
    })?;
    output.write_all(raw.hex.as_bytes()).map_err(|e| {
        log::error!("出力ファイルへの書き込みに失敗しました。");
        GatewayError::Io(e)
    })?;
    log::info!("Raw transactionを {:?} に保存しました。", output_file);
    Ok(())
}

fn decode(coin: &CoinMeta, rawtx: &str) -> Result<serde_json::Value> {
    match coin.family() {
        CoinFamily::Skycoin => {
            let bytes = hex::decode(rawtx.trim()).map_err(|e| {
                GatewayError::MalformedInput(format!("raw transaction is not hex: {e}"))
            })?;
            let tx = SkyTransaction::deserialize(&bytes)?;
            let decimals = coin.family().decimals();
            Ok(serde_json::json!({
                "txid": tx.txid()?,
                "length": tx.length,
                "type": tx.tx_type,
                "inner_hash": hex::encode(tx.inner_hash),
                "sigs": tx.sigs.iter().map(hex::encode).collect::<Vec<_>>(),
                "inputs": tx.inputs.iter().map(hex::encode).collect::<Vec<_>>(),
                "outputs": tx.outputs.iter().map(|o| serde_json::json!({
                    "address": o.address.to_string(),
                    "coins": format_amount(o.coins, decimals),
                    "hours": o.hours,
                })).collect::<Vec<_>>(),
            }))
        }
        CoinFamily::Bitcoin => {
            let tx: Transaction = encode::deserialize_hex(rawtx.trim())
                .map_err(|e| GatewayError::SerializationFailure(e.to_string()))?;
            let mut value = serde_json::to_value(&tx)?;
            value["txid"] = serde_json::Value::String(tx.compute_txid().to_string());
            Ok(value)
        }
    }
}

async fn run(args: CliArgs) -> Result<()> {
    if let Command::NewSeed = args.command {
        return print_json(&serde_json::json!({ "seed": keys::new_seed()? }));
    }
    if let Command::Version = args.command {
        println!("{VERSION}");
        return Ok(());
    }

    let registry = CoinRegistry::load(&args.config)?;
    let mut config = GatewayConfig::new(registry);
    if let Some(server) = &args.server {
        config = config.with_server(server.as_str());
    }
    log::info!("ゲートウェイサーバー: {}", config.server_url);

    let engine = Engine::new(&config);
    let node = HttpNode::new(&config)?;

    match args.command {
        Command::Coins { remote: true } => print_json(&node.supported_coins().await?),
        Command::Coins { remote: false } => print_json(&config.coins.iter().collect::<Vec<_>>()),
        Command::Addresses {
            coin,
            seed,
            last_seed,
            qty,
        } => {
            // lastseed は明示的に指定された場合だけ16進数として解釈する
            let seed = if last_seed {
                Seed::Resume(&seed)
            } else {
                Seed::Text(&seed)
            };
            print_json(&engine.derive_addresses(&coin, seed, qty)?)
        }
        Command::Balance { coin, addrs } => {
            print_json(&node.balance(engine.coin(&coin)?, &split_addresses(&addrs)).await?)
        }
        Command::Outputs { coin, addrs } => {
            let meta = engine.coin(&coin)?;
            let outputs = node.fetch_outputs(meta, &split_addresses(&addrs)).await?;
            let balance = Balance::of(&outputs);
            print_json(&serde_json::json!({
                "outputs": outputs,
                "coins": format_amount(balance.coins, meta.family().decimals()),
                "hours": balance.hours,
            }))
        }
        Command::Build {
            input_file,
            output_file,
        } => build_offline(&engine, &input_file, &output_file),
        Command::Send {
            coin,
            addrs,
            keys,
            to,
            amount,
        } => {
            let request = SendRequest {
                coin_type: &coin,
                input_addresses: &addrs,
                private_keys: &keys,
                destination: &to,
                amount: &amount,
            };
            let txid = engine.send_coins(&node, &node, &request).await?;
            log::info!("トランザクションを送信しました。txid={}", txid);
            print_json(&serde_json::json!({ "txid": txid }))
        }
        Command::Transaction { coin, txid } => {
            print_json(&node.transaction(engine.coin(&coin)?, &txid).await?)
        }
        Command::Decode { coin, rawtx } => print_json(&decode(engine.coin(&coin)?, &rawtx)?),
        Command::NewSeed | Command::Version => Ok(()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args = CliArgs::parse();
    log::info!("coin-gateway-signer {} を開始します。", VERSION);

    if let Err(e) = run(args).await {
        log::error!("{:?} 段階で失敗しました: {}", e.stage(), e);
        return Err(e);
    }
    Ok(())
}
