//! Runs a few sources through the `vt` command line
//!
//! ```bash
//! cargo run --example selftest -- --failing-tests
//! cargo run --example selftest -- runner --test-name-filter "^run/"
//! ```

use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use vt::executor::SourceSet;
use vt::utils::{sleep, time};
use vt::{Config, ConfigNode, Runner, RunnerConfig, Timeout};

fn main() -> ExitCode {
    let sources = SourceSet::new()
        .with("config", |root| {
            let inherited = root.describe_with("inherited", Config::new().timeout_ms(50), |suite| {
                suite.it("reads parent timeout", || async { Ok(()) })?;
                suite.it_with("overrides", Config::new().timeout_ms(5), || async { Ok(()) })?;
                Ok(())
            })?;

            let tests = inherited.tests();
            anyhow::ensure!(tests[0].timeout() == Timeout::from_millis(50));
            anyhow::ensure!(tests[1].timeout() == Timeout::from_millis(5));
            Ok(())
        })
        .with("hooks", |root| {
            let order = Arc::new(Mutex::new(Vec::new()));

            let log = order.clone();
            root.before_each(move |_| {
                let log = log.clone();
                async move {
                    log.lock().map_err(|_| anyhow::anyhow!("poisoned"))?.push("outer");
                    Ok(())
                }
            });
            root.describe("inner", |suite| {
                let log = order.clone();
                suite.before_each(move |_| {
                    let log = log.clone();
                    async move {
                        log.lock().map_err(|_| anyhow::anyhow!("poisoned"))?.push("inner");
                        Ok(())
                    }
                });

                let log = order.clone();
                suite.it("runs outer hooks first", move || {
                    let log = log.clone();
                    async move {
                        let seen = log.lock().map_err(|_| anyhow::anyhow!("poisoned"))?.clone();
                        assert_eq!(seen, ["outer", "inner"]);
                        Ok(())
                    }
                })?;
                Ok(())
            })?;
            Ok(())
        })
        .with("runner", |root| {
            root.describe("run", |suite| {
                suite.it("parallel roots", || async {
                    let mut runner = Runner::new(RunnerConfig::default());
                    for name in ["suite1", "suite2"] {
                        runner.describe(name, |suite| {
                            suite.it("test", || async {
                                sleep(10).await;
                                Ok(())
                            })?;
                            Ok(())
                        });
                    }

                    let timed = time(runner.run()).await;
                    assert!(timed.duration_ms() >= 10.0);
                    assert!(timed.duration_ms() < 40.0);
                    Ok(())
                })?;

                suite.it_done("done handle", |done| async move {
                    sleep(1).await;
                    done.ok();
                    Ok(())
                })?;
                Ok(())
            })?;
            Ok(())
        });

    vt::cli::main(sources)
}
