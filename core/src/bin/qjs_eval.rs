/*
 * Copyright (c) 2026 Mohamad Al-Zawahreh (dba Sovereign Systems).
 *
 * This file is part of the Ark QuickJS Host.
 *
 * LICENSE: DUAL-LICENSED (AGPLv3 or COMMERCIAL).
 *
 * 1. OPEN SOURCE: You may use this file under the terms of the GNU Affero
 * General Public License v3.0. If you link to this code, your ENTIRE
 * application must be open-sourced under AGPLv3.
 *
 * 2. COMMERCIAL: For proprietary use, you must obtain a Commercial License
 * from Sovereign Systems.
 *
 * PATENT NOTICE: Protected by US Patent App #63/935,467.
 * NO IMPLIED LICENSE to rights of Mohamad Al-Zawahreh or Sovereign Systems.
 */

use qjs_host::{EngineConfig, Host, QjsError, Runtime};
use std::env;
use std::fs;
use std::process;

const USAGE: &str = "Usage: qjs_eval [--config <config.json>] <engine.wasm> <script.js>";

struct Args {
    config: Option<String>,
    engine: String,
    script: String,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Option<Args> {
    let mut config = None;
    let mut positional = Vec::new();
    while let Some(arg) = args.next() {
        if arg == "--config" {
            config = Some(args.next()?);
        } else {
            positional.push(arg);
        }
    }
    let [engine, script]: [String; 2] = positional.try_into().ok()?;
    Some(Args {
        config,
        engine,
        script,
    })
}

/// Returns false when the script threw.
fn run(args: &Args) -> Result<bool, QjsError> {
    let config = match &args.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    let source = fs::read_to_string(&args.script)?;

    let host = Host::from_file(&args.engine, &config.host)?;
    let runtime = Runtime::with_options(&host, &config.runtime)?;
    let context = match &config.intrinsics {
        Some(selection) => runtime.new_context_with(selection)?,
        None => runtime.new_context()?,
    };

    let result = context.eval(&source)?;
    if result.is_exception()? {
        let thrown = context.take_exception()?;
        eprintln!("Uncaught {}", thrown.get_string()?);
        return Ok(false);
    }

    println!("{}: {}", result.type_of()?, result.get_string()?);
    let output = host.take_output();
    for line in output.printed {
        println!("{}", line);
    }
    Ok(true)
}

fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();

    let Some(args) = parse_args(env::args().skip(1)) else {
        eprintln!("{}", USAGE);
        process::exit(2);
    };

    match run(&args) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}
