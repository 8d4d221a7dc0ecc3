use std::num::NonZeroUsize;

use ndarray::arr2;
use rand::{SeedableRng, rngs::StdRng};

use perceptron::{
    MlErr, Model,
    arch::activations::ActFn,
    training::{TrainingContext, TrainingExample, evaluate},
};

fn nz(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap()
}

fn doubling() -> Vec<TrainingExample> {
    (3..=6)
        .map(|x| TrainingExample::new(vec![x as f64], vec![2. * x as f64]))
        .collect()
}

fn seeded_model(seed: u64) -> Model {
    let mut rng = StdRng::seed_from_u64(seed);
    Model::new(&mut rng, ActFn::sigmoid(), ActFn::linear(1.), &[1, 3, 3, 1]).unwrap()
}

/// A linear 1-3-3-1 network, so the trained and predicted inputs agree.
fn line_model() -> Model {
    let weights = vec![
        arr2(&[[0.5, 0.1], [0.4, -0.2], [0.6, 0.3]]),
        arr2(&[
            [0.3, 0.5, 0.2, 0.1],
            [0.4, 0.1, 0.3, -0.1],
            [0.2, 0.3, 0.5, 0.2],
        ]),
        arr2(&[[0.4, 0.5, 0.3, 0.1]]),
    ];
    Model::from_weights(weights, ActFn::linear(1.), ActFn::linear(1.)).unwrap()
}

#[test]
fn single_worker_single_example_matches_train() {
    let examples = doubling();
    let model = seeded_model(3453);

    let mut sequential = TrainingContext::new(model.clone());
    sequential.train(&examples, 10, 0.01, None).unwrap();

    let mut chunked = TrainingContext::new(model.clone());
    chunked
        .train_chunked(&examples, 10, nz(1), nz(1), 0.01, None)
        .unwrap();

    assert_ne!(sequential.weights(), model.weights());
    assert_eq!(sequential.weights(), chunked.weights());
}

#[test]
fn equivalence_holds_on_wider_models() {
    let examples: Vec<_> = (0..7)
        .map(|i| {
            let x = i as f64 / 7.;
            TrainingExample::new(vec![x, 1. - x, x * x], vec![x.sin(), x.cos()])
        })
        .collect();
    let mut rng = StdRng::seed_from_u64(99);
    let model = Model::new(&mut rng, ActFn::tanh(), ActFn::sigmoid(), &[3, 5, 4, 2]).unwrap();

    let mut sequential = TrainingContext::new(model.clone());
    sequential.train(&examples, 25, 0.2, None).unwrap();

    let mut chunked = TrainingContext::new(model);
    chunked
        .train_chunked(&examples, 25, nz(1), nz(1), 0.2, None)
        .unwrap();

    assert_eq!(sequential.weights(), chunked.weights());
}

#[test]
fn many_workers_still_learn() {
    let examples: Vec<_> = [(0., 0.), (0., 1.), (1., 0.), (1., 1.)]
        .into_iter()
        .map(|(a, b)| TrainingExample::new(vec![a, b], vec![if a + b > 0. { 1. } else { 0. }]))
        .collect();
    let weights = vec![
        arr2(&[
            [0.5, 0.5, 0.1],
            [0.4, -0.3, 0.2],
            [-0.3, 0.6, 0.1],
            [0.7, 0.2, -0.1],
        ]),
        arr2(&[[0.3, -0.2, 0.4, 0.1, 0.]]),
    ];
    let model = Model::from_weights(weights, ActFn::relu(), ActFn::sigmoid()).unwrap();
    let before = evaluate(&model, &examples).unwrap();

    let mut ctx = TrainingContext::new(model);
    ctx.train_chunked(&examples, 500, nz(3), nz(2), 0.3, None)
        .unwrap();

    assert!(!ctx.has_nan());
    assert!(evaluate(&ctx, &examples).unwrap() < before);
}

#[test]
fn two_workers_fit_a_line() {
    let examples = doubling();
    let mut ctx = TrainingContext::new(line_model());

    ctx.train_chunked(&examples, 30_000, nz(2), nz(2), 0.001, None)
        .unwrap();

    for example in &examples {
        let output = ctx.predict(example.input()).unwrap();
        assert_eq!(output[0].round(), example.target()[0], "{output}");
    }
    assert!(!ctx.has_nan());
}

#[tokio::test(flavor = "multi_thread")]
async fn blocking_call_within_a_runtime() {
    let examples = doubling();
    let model = seeded_model(3453);

    let mut sequential = TrainingContext::new(model.clone());
    sequential.train(&examples, 10, 0.01, None).unwrap();

    let mut chunked = TrainingContext::new(model);
    chunked
        .train_chunked(&examples, 10, nz(1), nz(1), 0.01, None)
        .unwrap();

    assert_eq!(sequential.weights(), chunked.weights());
}

#[tokio::test]
async fn async_call_on_a_current_thread_runtime() {
    let examples = doubling();
    let model = seeded_model(3453);

    let mut sequential = TrainingContext::new(model.clone());
    sequential.train(&examples, 10, 0.01, None).unwrap();

    let mut chunked = TrainingContext::new(model.clone());
    let res = chunked.train_chunked(&examples, 10, nz(1), nz(1), 0.01, None);
    assert!(matches!(res, Err(MlErr::BlockingInRuntime)));
    assert_eq!(chunked.weights(), model.weights());

    chunked
        .train_chunked_async(&examples, 10, nz(1), nz(1), 0.01, None)
        .await
        .unwrap();

    assert_eq!(sequential.weights(), chunked.weights());
}

#[test]
fn on_epoch_sees_every_epoch() {
    let examples = doubling();
    let model = seeded_model(7);
    let mut seen = Vec::new();
    let mut record = |epoch: usize, snapshot: &Model| {
        seen.push(epoch);
        assert_eq!(snapshot.input_size(), 1);
    };

    let mut ctx = TrainingContext::new(model);
    ctx.train_chunked(&examples, 6, nz(2), nz(3), 0.001, Some(&mut record))
        .unwrap();

    assert_eq!(seen, (0..6).collect::<Vec<_>>());
}

#[test]
fn workers_outnumbering_chunks() {
    let examples = doubling();
    let model = seeded_model(11);

    let mut ctx = TrainingContext::new(model.clone());
    ctx.train_chunked(&examples, 3, nz(8), nz(4), 0.001, None)
        .unwrap();

    assert_ne!(ctx.weights(), model.weights());
    assert!(!ctx.has_nan());
}

#[test]
fn mismatched_examples_fail_before_training() {
    let mut examples = doubling();
    examples.push(TrainingExample::new(vec![1., 2.], vec![3.]));
    let model = seeded_model(1);

    let mut ctx = TrainingContext::new(model.clone());
    let res = ctx.train_chunked(&examples, 3, nz(2), nz(1), 0.01, None);

    assert!(matches!(
        res,
        Err(MlErr::SizeMismatch {
            what: "example input",
            got: 2,
            expected: 1
        })
    ));
    assert_eq!(ctx.weights(), model.weights());
}
