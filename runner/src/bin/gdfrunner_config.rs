fn main() {
    let config = gdfrunner::config::RunnerConfig::default();
    println!("{}", serdeconv::to_toml_string(&config).expect("failed to generate config file"));
}
