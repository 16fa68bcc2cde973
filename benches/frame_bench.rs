use bytes::BytesMut;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use lobby_relay::core::codec::FrameCodec;
use lobby_relay::core::frame::Frame;
use lobby_relay::protocol::message::{LobbyInfo, LobbyListResponse, ResponseType};
use lobby_relay::protocol::types::{LobbyId, UserId};
use tokio_util::codec::{Decoder, Encoder};

#[allow(clippy::unwrap_used)]
fn bench_frame_encode_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encode_decode");
    let body_sizes = [16usize, 256, 1024, 4095];

    for &size in &body_sizes {
        let frame = Frame::from_raw(1, 0, vec![0xA5u8; size].into()).unwrap();
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_function(format!("encode_{size}b"), |b| {
            b.iter_batched(
                || frame.clone(),
                |frame| {
                    let mut buf = BytesMut::with_capacity(size + 32);
                    FrameCodec.encode(frame, &mut buf).unwrap();
                },
                BatchSize::SmallInput,
            )
        });

        let mut wire = BytesMut::new();
        FrameCodec.encode(frame.clone(), &mut wire).unwrap();
        group.bench_function(format!("decode_{size}b"), |b| {
            b.iter_batched(
                || wire.clone(),
                |mut buf| {
                    let decoded = FrameCodec.decode(&mut buf).unwrap();
                    assert!(decoded.is_some());
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

#[allow(clippy::unwrap_used)]
fn bench_lobby_list(c: &mut Criterion) {
    let lobbies: Vec<LobbyInfo> = (1..=20)
        .map(|id| LobbyInfo {
            lobby_id: LobbyId(id),
            name: format!("Lobby {id}"),
            owner: UserId(id),
            members: [UserId(id), UserId::NONE, UserId::NONE, UserId::NONE],
            has_password: id % 2 == 0,
            password: None,
            data: Vec::new(),
            member_data: None,
        })
        .collect();
    let body = LobbyListResponse { lobbies };

    c.bench_function("lobby_list_frame", |b| {
        b.iter(|| {
            let frame = Frame::new(ResponseType::LobbyList.as_u16(), 0, &body).unwrap();
            let _: LobbyListResponse = frame.decode_body().unwrap();
        })
    });
}

criterion_group!(benches, bench_frame_encode_decode, bench_lobby_list);
criterion_main!(benches);
