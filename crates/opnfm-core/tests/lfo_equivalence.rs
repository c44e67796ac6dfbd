//! A disabled LFO must be numerically indistinguishable from a chip whose
//! LFO was never touched, sample for sample.

use opnfm::{Ym2151, Ym2612};

fn opn2_voice(chip: &mut Ym2612) {
    let writes: &[(u8, u8)] = &[
        (0xb0, 0x07), // algorithm 7
        (0x3c, 0x08), // slot 4 multiple
        (0x4c, 0x00), // slot 4 level
        (0x5c, 0x1f), // slot 4 attack
        (0xa4, 0x22),
        (0xa0, 0x69),
        (0x28, 0xf0), // key on
    ];
    for &(a, v) in writes {
        chip.write(0, a);
        chip.write(1, v);
    }
}

#[test]
fn opn2_lfo_off_equals_lfo_absent() {
    let mut plain = Ym2612::new(7_670_448, 44_100).unwrap();
    let mut disabled = Ym2612::new(7_670_448, 44_100).unwrap();

    // `plain` never touches the LFO; `disabled` programs depths and AM
    // enables, then switches the LFO off again
    opn2_voice(&mut plain);
    plain.write(0, 0xb4);
    plain.write(1, 0xc0); // pan only

    opn2_voice(&mut disabled);
    disabled.write(0, 0x22);
    disabled.write(1, 0x0f); // LFO on, fastest
    disabled.write(0, 0xb4);
    disabled.write(1, 0xf7); // pan + AMS 3 + PMS 7
    disabled.write(0, 0x6c);
    disabled.write(1, 0x80); // slot 4 AM enable (DR 0)
    disabled.write(0, 0x22);
    disabled.write(1, 0x00); // LFO off again
    disabled.write(0, 0xb4);
    disabled.write(1, 0xc0); // depths back to zero
    disabled.write(0, 0x6c);
    disabled.write(1, 0x00);

    let (mut l1, mut r1) = ([0i16; 2048], [0i16; 2048]);
    let (mut l2, mut r2) = ([0i16; 2048], [0i16; 2048]);
    plain.update(&mut l1, &mut r1);
    disabled.update(&mut l2, &mut r2);
    assert_eq!(l1, l2);
    assert_eq!(r1, r2);
}

#[test]
fn opn2_lfo_on_actually_modulates() {
    let mut plain = Ym2612::new(7_670_448, 44_100).unwrap();
    let mut wobbling = Ym2612::new(7_670_448, 44_100).unwrap();

    opn2_voice(&mut plain);
    plain.write(0, 0xb4);
    plain.write(1, 0xc0);

    opn2_voice(&mut wobbling);
    wobbling.write(0, 0x22);
    wobbling.write(1, 0x0f);
    wobbling.write(0, 0xb4);
    wobbling.write(1, 0xf7); // pan + AMS + PMS
    wobbling.write(0, 0x6c);
    wobbling.write(1, 0x80); // AM enable

    let (mut l1, mut r1) = ([0i16; 2048], [0i16; 2048]);
    let (mut l2, mut r2) = ([0i16; 2048], [0i16; 2048]);
    plain.update(&mut l1, &mut r1);
    wobbling.update(&mut l2, &mut r2);
    assert_ne!(l1, l2, "an enabled LFO must change the output");
}

#[test]
fn opm_zero_depth_equals_lfo_absent() {
    let mut plain = Ym2151::new(3_579_545, 44_100).unwrap();
    let mut zeroed = Ym2151::new(3_579_545, 44_100).unwrap();

    for chip in [&mut plain, &mut zeroed] {
        let writes: &[(u8, u8)] = &[
            (0x20, 0xc7), // both speakers, algorithm 7
            (0x60, 0x00), // slot 1 level
            (0x80, 0x1f), // slot 1 attack
            (0x28, 0x4a), // key code
            (0x08, 0x08), // key on slot 1
        ];
        for &(a, v) in writes {
            chip.write(0, a);
            chip.write(1, v);
        }
    }
    // `zeroed` programs the LFO rate, waveform and per-channel sensitivity,
    // but both depth registers stay at zero
    let writes: &[(u8, u8)] = &[
        (0x18, 0xff), // LFO frequency
        (0x1b, 0x02), // triangle
        (0x38, 0x73), // PMS 7 / AMS 3
        (0xa0, 0x80), // slot 1 AM enable (D1R 0)
        (0x19, 0x00), // AMD = 0
        (0x19, 0x80), // PMD = 0
    ];
    for &(a, v) in writes {
        zeroed.write(0, a);
        zeroed.write(1, v);
    }

    let (mut l1, mut r1) = ([0i16; 2048], [0i16; 2048]);
    let (mut l2, mut r2) = ([0i16; 2048], [0i16; 2048]);
    plain.update(&mut l1, &mut r1);
    zeroed.update(&mut l2, &mut r2);
    assert_eq!(l1, l2);
    assert_eq!(r1, r2);
}
