use seizure_nn::prelude::*;

// End to end run on the seizure csv files: load, scale, optionally reduce,
// train with checkpoints, then report on the test file with the best weights.
//
//   cargo run --example seizure -- config.example.toml
pub fn main() {
    fastrand::seed(1);
    if let Err(e) = run() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cfg = match std::env::args().nth(1) {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let (mut train_set, mut test_set) = match cfg.data.binary_base {
        Some(base) => (
            load_dataset_binary(&cfg.data.train_csv, base)?,
            load_dataset_binary(&cfg.data.test_csv, base)?,
        ),
        None => (
            load_dataset(&cfg.data.train_csv)?,
            load_dataset(&cfg.data.test_csv)?,
        ),
    };
    println!(
        "train: {} rows test: {} rows classes: {}",
        train_set.len(),
        test_set.len(),
        cfg.data.classes()
    );

    if cfg.data.scale {
        let (train_x, test_x) = feature_scaler(train_set.features(), test_set.features())?;
        train_set = train_set.with_features(train_x)?;
        test_set = test_set.with_features(test_x)?;
    }
    if let Some(new_d) = cfg.data.reduce_components {
        let (train_x, test_x) = feature_reduction(train_set.features(), test_set.features(), new_d)?;
        train_set = train_set.with_features(train_x)?;
        test_set = test_set.with_features(test_x)?;
    }

    let mut net = cfg.model.build(train_set.input_size(), cfg.data.classes())?;
    let mut opt = cfg.training.optimizer()?;
    println!("{net}\noptimizer: {}", opt.optimizer_type());

    let train_loader = DataLoader::new(train_set, cfg.training.loader_params());
    let test_loader = DataLoader::new(
        test_set,
        LoaderParams {
            batch_size: cfg.training.batch_size,
            shuffle: false,
        },
    );

    let save_path = cfg.training.save_path.as_path();
    let mut options = TrainOptions::new(cfg.training.epochs, save_path);
    if let Some(load_path) = &cfg.training.load_path {
        options = options.resume_from(load_path);
    }

    let criterion = Loss::SoftmaxAndCrossEntropy;
    let summary = match cfg.training.scheduler() {
        Some(mut scheduler) => train_scheduler_batch(
            &mut net,
            &mut scheduler,
            &mut opt,
            &criterion,
            &train_loader,
            &test_loader,
            &options,
        )?,
        None => train_batch(
            &mut net,
            &mut opt,
            &criterion,
            &train_loader,
            &test_loader,
            &options,
        )?,
    };
    println!(
        "ran {} epochs from {}, best eval loss {}",
        summary.epochs_run, summary.start_epoch, summary.best_loss
    );

    if !summary.checkpoints.is_empty() {
        load_checkpoint(&mut net, &mut opt, save_path)?;
    }

    let predicted = predict(&net, test_loader.dataset().features())?;
    report(test_loader.dataset().labels(), &predicted)?;
    Ok(())
}
