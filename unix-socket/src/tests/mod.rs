#![cfg(test)]

mod listen;
